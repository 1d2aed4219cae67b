pub mod animation;
pub mod animations;
pub mod app;
pub mod audio;
pub mod capture;
pub mod compute;
pub mod config;
pub mod controller;
pub mod fractal;
pub mod gradient;
pub mod interp;
pub mod kernel;
pub mod midi;
pub mod modulator;
pub mod params;
pub mod plane;
pub mod render;
pub mod scene;
pub mod terminal;
