//! 离线数据集：追踪日志 -> 监督微调记录（JSONL）

pub mod builder;

pub use builder::{
    build_sft_records, build_trajectory_dataset, records_from_events, ChatMessage, DatasetSummary, SftRecord,
};
