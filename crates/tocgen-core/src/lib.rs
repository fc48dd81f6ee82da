pub mod backend;
pub mod completion;
pub mod config_file;
pub mod controller;
pub mod document;
pub mod prompt;
pub mod session;
pub mod window;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use completion::mock::{MockCompletion, MockReply};
pub use completion::openai::OpenAiClient;
pub use completion::{CompletionClient, CompletionError, Role, Turn};
pub use controller::{
    AdvanceError, CompletionSignal, ContextMode, Dispatch, GenerationSettings, RoundPlan,
    RoundReport, advance,
};
pub use document::Document;
pub use session::{
    CompletionReason, Phase, RoundTicket, Session, SessionStore, SubmitOutcome, TocAccumulator,
};
pub use window::{PageSelection, SegmentSource, TextSegment, TextWindow, WindowError, WindowStrategy, window};
