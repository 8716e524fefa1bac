pub mod pollers;
