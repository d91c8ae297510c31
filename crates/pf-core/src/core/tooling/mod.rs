pub mod diagram;
pub mod latin1;
