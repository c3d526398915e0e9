//! Lua scripting for building flashcarts and fx data.

mod flashcart;
mod fxdata;
pub mod helpers;
pub mod slot;

pub use flashcart::{ScriptSession, run_flashcart_script};
pub use fxdata::run_fxdata_script;
pub use slot::{ScriptSlot, SlotFields};
