pub mod config;
pub mod consts;
pub mod dark;
pub mod error;
pub mod fit;
pub mod frame;
pub mod gain;
pub mod io;
pub mod linearity;
pub mod noise;
pub mod persistence;
pub mod qe;
pub mod series;
pub mod stack;
pub mod telegraph;
