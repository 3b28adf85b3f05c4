pub mod analysis; // Five-stage content analysis: resolve, validate, orchestrate, stream
