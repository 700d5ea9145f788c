// Sound library module
// Imports audio files from disk and serves stored bytes to the scheduler

pub mod fetcher;
pub mod scanner;

pub use fetcher::StoreFetcher;
pub use scanner::DirectoryScanner;
