pub mod evaluation;
pub mod loaders;
pub mod structure;
pub mod submission;

pub use evaluation::{
    DetailedScoreItem, ErrorKind, EvalStatus, Evaluation, EvaluationFailure, EvaluationResult,
};
pub use structure::{ExamStructure, QuestionEntry, StudentAnswers, ANSWER_NOT_FOUND};
pub use submission::{
    BatchRequest, BatchResponse, DirectEvaluationRequest, EvaluationResponse, HealthReport,
    Submission,
};
