//! End-to-end integration tests live under `tests/`.
