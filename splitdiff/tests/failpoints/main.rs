mod split_diff_test;
