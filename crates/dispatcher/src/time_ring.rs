use parking_lot::Mutex;

/// 时间轮槽位数，按秒取模
pub const RING_SLOTS: usize = 60;

/// 秒级时间轮
///
/// 每个槽位独立加锁：调度线程并发写入，时间轮线程整体取出并清空，
/// 保证同一槽位中的作业ID不会既被派发又残留在槽中。
pub struct TimeRing {
    slots: Vec<Mutex<Vec<i64>>>,
}

impl TimeRing {
    pub fn new() -> Self {
        Self {
            slots: (0..RING_SLOTS).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// 下次触发时间所在的槽位
    pub fn slot_of(trigger_time_ms: i64) -> usize {
        (trigger_time_ms / 1000).rem_euclid(RING_SLOTS as i64) as usize
    }

    pub fn push(&self, slot: usize, job_id: i64) {
        self.slots[slot % RING_SLOTS].lock().push(job_id);
    }

    /// 原子地取出并清空槽位
    pub fn take(&self, slot: usize) -> Vec<i64> {
        std::mem::take(&mut *self.slots[slot % RING_SLOTS].lock())
    }

    /// 当前秒与前一秒两个槽位的作业，前一秒用于吸收调度抖动
    pub fn take_due(&self, now_second: usize) -> Vec<i64> {
        let current = now_second % RING_SLOTS;
        let previous = (current + RING_SLOTS - 1) % RING_SLOTS;

        let mut due = self.take(current);
        due.extend(self.take(previous));
        due
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.lock().is_empty())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }
}

impl Default for TimeRing {
    fn default() -> Self {
        Self::new()
    }
}
