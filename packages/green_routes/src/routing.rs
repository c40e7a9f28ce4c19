//! Route finding over the road network, along with the cost model which
//! scores each edge by its greenness and air quality.

pub mod cost;
pub mod router;
pub mod structs;
