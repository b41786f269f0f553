mod helpers;
mod tests_scan;
