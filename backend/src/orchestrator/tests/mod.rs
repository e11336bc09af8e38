mod test_step_ordering;
