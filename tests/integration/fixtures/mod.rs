pub mod peer;
pub mod rig;
pub mod results;
