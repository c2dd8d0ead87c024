pub mod bools_to_int;
pub mod kinematics;
