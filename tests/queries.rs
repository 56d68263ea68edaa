use storefront_api::routes::params::LimitOffset;

#[test]
fn limit_offset_defaults() {
    let (limit, offset) = LimitOffset::default().normalize();
    assert_eq!(limit, 10);
    assert_eq!(offset, 0);
}

#[test]
fn limit_is_clamped_and_offset_floored() {
    let (limit, _) = LimitOffset {
        limit: Some(0),
        offset: None,
    }
    .normalize();
    assert_eq!(limit, 1);

    let (limit, offset) = LimitOffset {
        limit: Some(100_000),
        offset: Some(-5),
    }
    .normalize();
    assert_eq!(limit, 100);
    assert_eq!(offset, 0);
}
