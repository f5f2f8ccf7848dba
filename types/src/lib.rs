pub mod config;
pub mod nonstandard;
pub mod preset;

pub mod phase0 {
    pub mod consts;
    pub mod containers;
    pub mod primitives;
}
