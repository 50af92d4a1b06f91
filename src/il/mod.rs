//! Bytecode model: opcode tables, stream decoding and body emission.

pub mod assembler;
pub mod body;
pub mod decoder;
pub mod opcode;
pub mod operation;
pub mod parser;
