//! Rust client for the Gemini `generateContent` API
//!
//! Only the structured-output flavour is covered: a prompt is sent together with
//! a response schema and the model answers with a JSON document matching it.
//!
//! # Example
//!
//! ```no_run
//! use gemini_client::{GeminiClient, Schema};
//!
//! # async fn example() -> Result<(), gemini_client::GeminiError> {
//! let client = GeminiClient::new("api-key");
//!
//! let schema = Schema::object()
//!     .property("latitude", Schema::number())
//!     .property("longitude", Schema::number())
//!     .require(&["latitude", "longitude"]);
//!
//! let json = client
//!     .generate_json("Where is Tucson, AZ? Answer with coordinates.", &schema)
//!     .await?;
//! println!("{json}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod types;

pub use client::{GeminiClient, DEFAULT_MODEL};
pub use error::{GeminiError, Result};
pub use types::{Schema, SchemaType};
