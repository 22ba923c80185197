mod helpers;
mod metadata_tests;
mod write_tests;
