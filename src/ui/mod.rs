pub mod documents;
pub mod editor;
pub mod login;
pub mod upload;
