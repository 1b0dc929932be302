mod gatherer_test;
mod output_test;
