//! End-to-end tests for the cmdweave resolution pipeline live in `tests/`.
