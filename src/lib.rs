pub mod contracts;
pub mod form;
pub mod prelude;
pub mod reactive;
