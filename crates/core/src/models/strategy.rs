use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal / $title:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// 面向日志与触发信息的中文描述
            pub fn title(&self) -> &'static str {
                match self {
                    $($name::$variant => $title,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = SchedulerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(SchedulerError::Configuration(format!(
                        concat!("未知的", $kind, ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

/// 路由策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStrategy {
    First,
    Last,
    Round,
    Random,
    ConsistentHash,
    LeastFrequentlyUsed,
    LeastRecentlyUsed,
    Failover,
    Busyover,
    IdleThreadBased,
    ShardingBroadcast,
}

string_enum!(RouteStrategy, "路由策略", {
    First => "FIRST" / "第一个",
    Last => "LAST" / "最后一个",
    Round => "ROUND" / "轮询",
    Random => "RANDOM" / "随机",
    ConsistentHash => "CONSISTENT_HASH" / "一致性HASH",
    LeastFrequentlyUsed => "LEAST_FREQUENTLY_USED" / "最不经常使用",
    LeastRecentlyUsed => "LEAST_RECENTLY_USED" / "最近最久未使用",
    Failover => "FAILOVER" / "故障转移",
    Busyover => "BUSYOVER" / "忙碌转移",
    IdleThreadBased => "IDLE_THREAD_BASED" / "空闲线程优先",
    ShardingBroadcast => "SHARDING_BROADCAST" / "分片广播",
});

/// 阻塞处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStrategy {
    SerialExecution,
    DiscardLater,
    CoverEarly,
}

string_enum!(BlockStrategy, "阻塞处理策略", {
    SerialExecution => "SERIAL_EXECUTION" / "单机串行",
    DiscardLater => "DISCARD_LATER" / "丢弃后续调度",
    CoverEarly => "COVER_EARLY" / "覆盖之前调度",
});

/// 调度过期策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MisfireStrategy {
    DoNothing,
    FireOnceNow,
}

string_enum!(MisfireStrategy, "调度过期策略", {
    DoNothing => "DO_NOTHING" / "忽略",
    FireOnceNow => "FIRE_ONCE_NOW" / "立即执行一次",
});

/// 触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Cron,
    Retry,
    Parent,
    Api,
    Misfire,
}

string_enum!(TriggerType, "触发类型", {
    Manual => "MANUAL" / "手动触发",
    Cron => "CRON" / "定时触发",
    Retry => "RETRY" / "失败重试触发",
    Parent => "PARENT" / "父任务触发",
    Api => "API" / "API触发",
    Misfire => "MISFIRE" / "调度过期补偿",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_strategy_parse() {
        assert_eq!(
            "consistent_hash".parse::<RouteStrategy>().unwrap(),
            RouteStrategy::ConsistentHash
        );
        assert_eq!(RouteStrategy::ShardingBroadcast.as_str(), "SHARDING_BROADCAST");
        assert!("NEAREST".parse::<RouteStrategy>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_block_strategy_serde_matches_as_str() {
        let json = serde_json::to_string(&BlockStrategy::DiscardLater).unwrap();
        assert_eq!(json, "\"DISCARD_LATER\"");
        let parsed: BlockStrategy = serde_json::from_str("\"COVER_EARLY\"").unwrap();
        assert_eq!(parsed, BlockStrategy::CoverEarly);
    }

    #[test]
    fn test_misfire_strategy_unknown() {
        assert!("FIRE_TWICE".parse::<MisfireStrategy>().is_err());
        assert_eq!(
            " fire_once_now ".parse::<MisfireStrategy>().unwrap(),
            MisfireStrategy::FireOnceNow
        );
    }
}
