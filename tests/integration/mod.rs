mod gather_test;
