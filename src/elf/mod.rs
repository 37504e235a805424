//! Inspection of ELF files: their type, permissions, and symbols.

mod inspect;
pub(crate) mod parser;
pub(crate) mod types;

pub use inspect::defines_symbol;
pub use inspect::inspect;
pub use inspect::is_executable;
pub use inspect::is_usable_binary;
pub use inspect::symbol_table;
pub use inspect::ElfSymbol;
pub use inspect::ElfType;
pub use inspect::SymbolTable;

pub(crate) use parser::ElfParser;
