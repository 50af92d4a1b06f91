//! Call interception: trampoline and thunk body generation.
//!
//! [`builder::InterceptBuilder`] emits the replacement body that packages a
//! call's arguments and hands them to the dispatcher, while
//! [`thunk::ThunkBuilder`] emits the indirect-call body used to re-enter the
//! original native entry point.

pub mod builder;
pub mod thunk;
