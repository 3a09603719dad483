pub mod breaks;
