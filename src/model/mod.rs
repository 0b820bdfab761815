pub mod catalog;
pub mod commit;
pub mod navigation;
pub mod passcode;
pub mod secret;
pub mod selection;
pub mod session;
pub mod storage;
pub mod user;
