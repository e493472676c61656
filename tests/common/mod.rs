mod test_server;

pub use test_server::{FakeProvider, SECRET, TestResponse, TestServer};
