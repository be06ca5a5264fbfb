pub mod assessments;
pub mod calc;
pub mod core;
pub mod courses;
pub mod grades;
pub mod submissions;
