// tests/throttle/fixtures/mod.rs
