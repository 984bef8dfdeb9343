//! glance - find the most important parts of a source file.
//!
//! A file is cut into overlapping line windows, each window is embedded with
//! a BERT sentence encoder, and the windows are ranked by PageRank over their
//! cosine similarity graph. Windows that resemble much of the rest of the
//! file rank highest.
//!
//! # Quick start
//!
//! ```no_run
//! use glance::{ModelManager, glance::glance};
//!
//! let embedder = ModelManager::new().load().unwrap();
//! let content = std::fs::read_to_string("src/main.rs").unwrap();
//!
//! let windows = glance(&embedder, &content, 5).unwrap();
//! for w in windows.iter().take(3) {
//!     println!("{}-{} (score: {:.5})", w.start_line, w.end_line, w.score);
//! }
//! ```

pub mod cli;
pub mod embedding;
pub mod error;
pub mod glance;
pub mod model_manager;
pub mod output;
pub mod rank;
pub mod server;
pub mod source;
pub mod window;

pub use embedding::{BertEmbedder, EmbedConfig, Embedder};
pub use error::{Error, Result};
pub use glance::ScoredWindow;
pub use model_manager::ModelManager;
pub use rank::RankParams;
pub use window::Window;
