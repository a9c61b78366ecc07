//! Bindings generated by the build script from the `tlb-bindgen` fixture
//! libraries and compiled against `tlb-bindgen-rt`.
//!
//! | Module | Fixture |
//! |--------|---------|
//! | [`shapes`] | `shapes.json`: enum, record, alias, union, vtable and dispatch interfaces, event source, coclass |
//! | [`callbacks`] | `callbacks.json`: native `*Handler` interfaces |

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
