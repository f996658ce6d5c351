pub mod test_helpers;

mod proptest_fifo;
