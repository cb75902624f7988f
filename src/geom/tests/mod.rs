mod test_bvh_basic;
mod test_proximity_basic;
