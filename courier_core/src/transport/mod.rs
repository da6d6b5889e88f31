/*!
 * Transport layer: how bytes leave the process.
 *
 * - `engine`: the worker thread that multiplexes transfers
 * - `request`: request descriptions and callbacks
 * - `upload`: chunked upload sources for multipart bodies
 * - `transfer`: one transfer as a future, plus progress tracking
 * - `slots`: generation-checked arena of active transfers
 * - `options`: timeouts, redirects, user agent
 */

pub mod engine;
pub mod options;
pub mod request;
pub mod upload;

mod slots;
mod transfer;

pub use engine::Engine;
pub use options::TransportOptions;
pub use request::{
    Body, Callbacks, ChunkCallback, DoneCallback, Form, Method, Progress, ProgressCallback,
    Request,
};
pub use upload::{FileSource, MemorySource, Upload, UploadSource};
