//! Pipeline stages for document conversion.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! detect ──▶ input ──▶ command ──▶ exec ──▶ (output file)
//!                 │
//!                 └─ pdf_input (PDF in: pdftohtml → HTML on stdin)
//!
//! PDF out:  engine HTML ──▶ style ──▶ render ──▶ .pdf
//!           image bytes ──▶ image ──┘
//! ```
//!
//! 1. [`detect`]: guess the input format from MIME type, name and bytes
//! 2. [`input`]: size-check the source and stage it in the scratch dir
//! 3. [`command`]: build the engine argument list
//! 4. [`exec`]: run a subprocess with a deadline and kill-on-drop
//! 5. [`pdf_input`]: extract PDF input to HTML before the engine sees it
//! 6. [`style`]: built-in templates and CSS injection
//! 7. [`image`]: wrap image input in an HTML page
//! 8. [`render`]: single-threaded render loop that prints HTML to PDF

pub mod command;
pub mod detect;
pub mod exec;
pub mod image;
pub mod input;
pub mod pdf_input;
pub mod render;
pub mod style;
