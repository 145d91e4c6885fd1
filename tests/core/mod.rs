mod checker_tests;
mod leadership_tests;
mod watcher_tests;
