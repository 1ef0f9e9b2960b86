pub mod ballot;
pub mod choices;
pub mod token;
