//! Triad - 三角色智能体编排（Planner / Executor / Reviewer）
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量 TRIAD__*）
//! - **core**: 领域类型、错误分类、恢复策略
//! - **llm**: 模型后端适配（OpenAI 兼容 / Mock）、重试、JSON 提取
//! - **prompts**: 外部 TOML 模板与 codeact / react 模式档案
//! - **roles**: 三个角色及其确定性回退策略
//! - **tools**: 工具注册表（calculator、fetch_url）
//! - **environment**: 环境适配（通用模拟器）
//! - **episode**: 状态机、路由与一次运行的外壳
//! - **trace**: 会话与事件追踪（session.json + events.jsonl）
//! - **dataset**: 追踪 -> 微调数据导出
//! - **observability**: 日志初始化

pub mod config;
pub mod core;
pub mod dataset;
pub mod environment;
pub mod episode;
pub mod llm;
pub mod observability;
pub mod prompts;
pub mod roles;
pub mod tools;
pub mod trace;

pub use episode::{EpisodeOutcome, EpisodeRunner};
