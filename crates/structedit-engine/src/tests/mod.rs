//! Cross-module integration tests: full command flows through a session.

mod integration;
