mod helpers;

mod tests_basic;
mod tests_recovery;
mod tests_scan;
