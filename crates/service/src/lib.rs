pub mod service;

pub use service::{
    cancel_scan, close_session, get_scan_session, poll_scan_events, rescan, resolution_prompt,
    resolve_entry, result_tree, start_scan, CancelScanResponse, ScanRequest, ScanSessionSnapshot,
    ScanSessionStatus,
};
