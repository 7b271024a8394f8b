pub mod limits;
pub mod noise;
pub mod params;
