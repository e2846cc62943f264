//! Model factories shared by the unit tests.
