//! 业务能力层
//!
//! 评分调度器在测试失败时调用的两个外部协作者：
//! - `evidence` - 保存失败现场
//! - `feedback` - 生成反馈文本
//!
//! 两者的失败都由调用方吞掉，不影响评分结果

pub mod evidence;
pub mod feedback;

pub use evidence::{EvidenceSink, LocalEvidenceStore};
pub use feedback::{
    FallbackFeedbackGenerator, Feedback, FeedbackGenerator, LlmFeedbackGenerator, ScriptFailure,
    Severity,
};
