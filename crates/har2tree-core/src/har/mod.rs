//! HAR (HTTP Archive) file wrapper: loads a HAR document plus its colocated
//! side-car artifacts and exposes the entry/page surface the resolver needs.

mod file;

pub use file::HarFile;
