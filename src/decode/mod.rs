//! Device-format record decoders.
//!
//! Device-format decoders are, per the distilled specification, external
//! collaborators specified only via interfaces — except that one exact
//! decoder (Becker-Hickl SPC, the standard 4096-channel/12-bit format) is
//! pinned down by name in an end-to-end test scenario. [`bh_spc`]
//! implements exactly that record format, grounded on `tests/bh_spc.cpp`;
//! the PicoQuant T3 and Swabian tag-stream formats remain out of scope, as
//! named, with no concrete module here.
pub mod bh_spc;
