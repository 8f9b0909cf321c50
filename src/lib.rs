//! Schemat renders Minecraft schematic files into still images or rotating
//! videos by driving a pool of pre-warmed headless-browser pages, each hosting
//! the WebGL rendering front end. The HTTP layer accepts schematic uploads and
//! funnels them through the shared render backend.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
