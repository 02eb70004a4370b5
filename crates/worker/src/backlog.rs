//! # 回调积压
//!
//! 投递失败的回调批次按批落盘，每批一个文件，重试成功后删除。
//!
//! 文件格式：
//!
//! ```text
//! magic "JCBK" | version u8 | count u32(BE) | { len u32(BE) | JSON(HandleCallbackParam) } * count
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use scheduler_core::models::HandleCallbackParam;
use scheduler_core::{current_millis, SchedulerError, SchedulerResult};

const MAGIC: &[u8; 4] = b"JCBK";
const VERSION: u8 = 1;
const FILE_PREFIX: &str = "callback-";
const FILE_SUFFIX: &str = ".bin";

pub fn encode(batch: &[HandleCallbackParam]) -> SchedulerResult<Vec<u8>> {
    let count = u32::try_from(batch.len())
        .map_err(|_| SchedulerError::Backlog(format!("批次过大: {}", batch.len())))?;

    let mut data = Vec::with_capacity(9 + batch.len() * 64);
    data.extend_from_slice(MAGIC);
    data.push(VERSION);
    data.extend_from_slice(&count.to_be_bytes());
    for param in batch {
        let record = serde_json::to_vec(param)?;
        let len = u32::try_from(record.len())
            .map_err(|_| SchedulerError::Backlog(format!("记录过大: {}", record.len())))?;
        data.extend_from_slice(&len.to_be_bytes());
        data.extend_from_slice(&record);
    }
    Ok(data)
}

fn read_u32(data: &[u8], offset: &mut usize) -> SchedulerResult<u32> {
    let end = *offset + 4;
    let bytes: [u8; 4] = data
        .get(*offset..end)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| SchedulerError::Backlog(format!("文件在偏移 {} 处被截断", *offset)))?;
    *offset = end;
    Ok(u32::from_be_bytes(bytes))
}

pub fn decode(data: &[u8]) -> SchedulerResult<Vec<HandleCallbackParam>> {
    if data.len() < 5 || &data[..4] != MAGIC {
        return Err(SchedulerError::Backlog("文件头无效".to_string()));
    }
    if data[4] != VERSION {
        return Err(SchedulerError::Backlog(format!("不支持的版本: {}", data[4])));
    }

    let mut offset = 5;
    let count = read_u32(data, &mut offset)? as usize;
    let mut batch = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = read_u32(data, &mut offset)? as usize;
        let record = data
            .get(offset..offset + len)
            .ok_or_else(|| SchedulerError::Backlog(format!("记录在偏移 {offset} 处被截断")))?;
        batch.push(serde_json::from_slice(record)?);
        offset += len;
    }
    if offset != data.len() {
        return Err(SchedulerError::Backlog(format!(
            "文件尾部存在 {} 字节多余数据",
            data.len() - offset
        )));
    }
    Ok(batch)
}

/// 积压目录
#[derive(Debug)]
pub struct CallbackBacklog {
    dir: PathBuf,
    seq: AtomicU64,
}

impl CallbackBacklog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 写入一个批次，先写临时文件再改名，重试循环不会读到写了一半的文件
    pub async fn write(&self, batch: &[HandleCallbackParam]) -> SchedulerResult<PathBuf> {
        let data = encode(batch)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!(
            "{}{}-{}{}",
            FILE_PREFIX,
            current_millis(),
            self.seq.fetch_add(1, Ordering::SeqCst),
            FILE_SUFFIX
        );
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("回调批次已写入积压文件: path={}, size={}", path.display(), batch.len());
        Ok(path)
    }

    /// 按文件名排序的积压文件
    pub async fn list(&self) -> SchedulerResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn read(&self, path: &Path) -> SchedulerResult<Vec<HandleCallbackParam>> {
        let data = tokio::fs::read(path).await?;
        decode(&data)
    }

    pub async fn remove(&self, path: &Path) -> SchedulerResult<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{FAIL_CODE, SUCCESS_CODE};

    fn batch() -> Vec<HandleCallbackParam> {
        vec![
            HandleCallbackParam::new(1, 1000, SUCCESS_CODE, None),
            HandleCallbackParam::new(2, 2000, FAIL_CODE, Some("执行失败".to_string())),
        ]
    }

    #[test]
    fn test_layout() {
        let data = encode(&batch()).unwrap();
        assert_eq!(&data[..4], b"JCBK");
        assert_eq!(data[4], 1);
        assert_eq!(&data[5..9], &2u32.to_be_bytes());
        assert_eq!(decode(&data).unwrap(), batch());
    }

    #[test]
    fn test_rejects_corruption() {
        let mut data = encode(&batch()).unwrap();
        data[4] = 9;
        assert!(decode(&data).is_err());

        let data = encode(&batch()).unwrap();
        assert!(decode(&data[..data.len() - 3]).is_err());
        assert!(decode(b"XXXX").is_err());
    }

    #[tokio::test]
    async fn test_write_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let backlog = CallbackBacklog::new(dir.path().join("callbacklog"));
        assert!(backlog.list().await.unwrap().is_empty());

        let first = backlog.write(&batch()).await.unwrap();
        let second = backlog.write(&batch()[..1]).await.unwrap();
        assert_ne!(first, second);

        let files = backlog.list().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(backlog.read(&files[0]).await.unwrap().len(), 2);

        backlog.remove(&first).await.unwrap();
        assert_eq!(backlog.list().await.unwrap(), vec![second]);
    }
}
