// SPDX-License-Identifier: MIT

//! Small pieces shared by the auxpow crates: a std prelude so consensus code
//! imports one module instead of a dozen, and the error-conversion and
//! hash-literal macros.

pub mod macros;

pub mod prelude {
    pub use std::borrow::ToOwned;
    pub use std::boxed::Box;
    pub use std::fmt::Display;
    pub use std::fmt::Formatter;
    pub use std::fmt::{self};
    pub use std::string::String;
    pub use std::string::ToString;
    pub use std::vec;
    pub use std::vec::Vec;
}
