pub mod location;
pub mod outcome;
pub mod package;
pub mod proposal;
