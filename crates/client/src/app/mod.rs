mod bootstrap;
mod demo;
mod text_renderer;

pub(crate) use bootstrap::{build_app, AppWiring};
