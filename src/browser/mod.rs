pub mod chrome;
pub mod driver;
pub mod scripts;

pub use chrome::{ChromeDriver, ConnectionMode};
pub use driver::{ControlQuery, PageDriver};
