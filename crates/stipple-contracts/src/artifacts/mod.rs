mod namer;

pub use namer::{ArtifactNamer, NamingPolicy, DEFAULT_EXTENSION};
