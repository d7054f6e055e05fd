pub mod classify;
pub mod collab;
pub mod compare;
pub mod config;
pub mod error;
pub mod markdown;
pub mod model;
pub mod report;
pub mod resolve;
pub mod session;
pub mod tree;
pub mod walk;

pub use classify::{classify, Presentation};
pub use collab::{
    open_entry, reveal_entry, ExtensionKindLookup, ExternalOpener, KindLookup, PresentationSink,
    SystemOpener,
};
pub use compare::{CompareMethod, LevelComparison, PathComparator, DEFAULT_IGNORES};
pub use config::{CompareConfig, RestartPolicy};
pub use error::{
    CompareError, InvalidResolution, ResolveError, ResolveErrorKind, ScanError, SessionError,
};
pub use markdown::render_markdown_summary;
pub use model::{
    ChangeCounts, ChangeKind, ComparisonReport, Entry, EntryId, EntryNode, ScanEvent, ScanMessage,
    Side, REPORT_VERSION,
};
pub use report::{build_report, load_report, write_report};
pub use resolve::{disambiguate, prompt, CopyPlan, Direction, PromptChoice, ResolutionPrompt};
pub use session::{ScanSession, ScanState};
pub use tree::ResultTree;
pub use walk::{find_node, TreeWalker, WalkNode, WalkOutcome, WalkSink};
