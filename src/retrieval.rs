//! Contract consumed from the retrieval assembler.
//!
//! Chunking, embedding and index storage live behind [`Retriever`]; this module
//! only pins down the shape of what comes back and assembles it into prompt
//! context deterministically.

#[path = "retrieval/chunk.rs"]
mod chunk;

#[path = "retrieval/assembler.rs"]
mod assembler;

pub use assembler::{
    assemble_context, RetrievalAssembler, Retrieval, RetrievalQuery, CONTEXT_DELIMITER,
    DEFAULT_MAX_CONTEXT_CHARS,
};
pub use chunk::{RetrievalError, RetrievedChunk, Retriever};
