pub mod scoredb;
