//! Tests for builder accumulation and freeze-time validation.

use quarry::expr::count_star;
use quarry::prelude::*;

fn good_info() -> EntityDescriptor {
    EntityDescriptor::builder("good_info", "good_infos")
        .field("id", SemanticType::Integer, "id")
        .field("title", SemanticType::Text, "title")
        .field("price", SemanticType::Float, "price")
        .field("type_id", SemanticType::Integer, "type_id")
        .field("sort", SemanticType::Integer, "good_order")
        .build()
        .unwrap()
}

fn good_type() -> EntityDescriptor {
    EntityDescriptor::builder("good_type", "good_types")
        .field("id", SemanticType::Integer, "id")
        .field("name", SemanticType::Text, "name")
        .build()
        .unwrap()
}

#[test]
fn test_build_freezes_and_builder_stays_reusable() {
    let info = good_info();
    let builder = QueryBuilder::from(&info).filter(info.field_ref("price").unwrap().gt(10).unwrap());

    let first = builder.build().unwrap();
    let narrowed = builder
        .clone()
        .filter(info.field_ref("type_id").unwrap().eq(3).unwrap())
        .build()
        .unwrap();

    // Freezing again without mutation reproduces the same spec; the
    // narrowed build does not leak back into the first.
    assert_eq!(builder.build().unwrap(), first);
    assert_ne!(narrowed, first);
}

#[test]
fn test_default_projection_is_first_source_entity() {
    let info = good_info();
    let spec = QueryBuilder::from(&info).build().unwrap();
    assert_eq!(spec.projection, Projection::Entity("good_info".into()));
    assert_eq!(spec.projection_width(), 5);
}

#[test]
fn test_no_source_rejected() {
    let err = QueryBuilder::from_all(std::iter::empty::<&EntityDescriptor>())
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::NoSource));
}

#[test]
fn test_out_of_scope_field_rejected() {
    let info = good_info();
    let types = good_type();
    // Filter references good_type, which is not a source.
    let err = QueryBuilder::from(&info)
        .filter(types.field_ref("id").unwrap().eq(3).unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::FieldOutOfScope { .. }));
}

#[test]
fn test_having_requires_group_by() {
    let info = good_info();
    let err = QueryBuilder::from(&info)
        .having(info.field_ref("price").unwrap().gt(10).unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::HavingWithoutGroupBy));
}

#[test]
fn test_having_may_only_touch_grouped_or_aggregated_fields() {
    let info = good_info();
    let type_id = info.field_ref("type_id").unwrap();
    let price = info.field_ref("price").unwrap();

    let ok = QueryBuilder::from(&info)
        .select(vec![type_id.expr(), price.sum().unwrap()])
        .group_by(&type_id)
        .having(price.sum().unwrap().gt_value(10).and(type_id.gt(0).unwrap()))
        .build();
    assert!(ok.is_ok());

    let err = QueryBuilder::from(&info)
        .select(vec![type_id.expr()])
        .group_by(&type_id)
        .having(price.gt(10).unwrap())
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::UngroupedHavingField(_)));
}

#[test]
fn test_aggregate_projection_may_not_mix_bare_fields() {
    let info = good_info();
    let err = QueryBuilder::from(&info)
        .select(vec![
            info.field_ref("title").unwrap().expr(),
            info.field_ref("price").unwrap().sum().unwrap(),
        ])
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::UngroupedField(_)));
}

#[test]
fn test_grouped_order_key_must_be_grouped() {
    let info = good_info();
    let type_id = info.field_ref("type_id").unwrap();
    let price = info.field_ref("price").unwrap();

    let err = QueryBuilder::from(&info)
        .select(vec![type_id.expr(), price.sum().unwrap()])
        .group_by(&type_id)
        .order_by(&price, SortDir::Asc)
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::UngroupedField(_)));

    // Ordering by the grouped key itself is fine.
    let ok = QueryBuilder::from(&info)
        .select(vec![type_id.expr(), price.sum().unwrap()])
        .group_by(&type_id)
        .order_by(&type_id, SortDir::Desc)
        .build();
    assert!(ok.is_ok());

    // A pure-aggregate query has no groups to order by.
    let err = QueryBuilder::from(&info)
        .select(vec![price.sum().unwrap()])
        .order_by(&type_id, SortDir::Asc)
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::UngroupedField(_)));
}

#[test]
fn test_duplicate_alias_rejected() {
    let info = good_info();
    let err = QueryBuilder::from(&info)
        .select(vec![
            ProjectionBinding::from(info.field_ref("id").unwrap().expr()).with_alias("x"),
            ProjectionBinding::from(info.field_ref("title").unwrap().expr()).with_alias("x"),
        ])
        .build()
        .unwrap_err();
    assert!(matches!(err, InvalidQueryError::DuplicateAlias(_)));
}

#[test]
fn test_count_variant_strips_shaping() {
    let info = good_info();
    let price = info.field_ref("price").unwrap();
    let spec = QueryBuilder::from(&info)
        .filter(price.gt(10).unwrap())
        .order_by(&price, SortDir::Desc)
        .offset(5)
        .limit(10)
        .build()
        .unwrap();

    let count = spec.count_variant();
    assert_eq!(count.predicate, spec.predicate);
    assert!(count.order_by.is_empty());
    assert_eq!(count.offset, None);
    assert_eq!(count.limit, None);
    assert_eq!(
        count.projection,
        Projection::Expressions(vec![ProjectionBinding::from(count_star())])
    );
}

#[test]
fn test_spec_rendering() {
    let info = good_info();
    let types = good_type();
    let spec = QueryBuilder::from_all([&info, &types])
        .select_entity(&info)
        .filter(
            info.field_ref("type_id")
                .unwrap()
                .eq_field(&types.field_ref("id").unwrap())
                .unwrap(),
        )
        .filter(types.field_ref("id").unwrap().eq(3).unwrap())
        .order_by(&info.field_ref("sort").unwrap(), SortDir::Desc)
        .build()
        .unwrap();

    insta::assert_snapshot!(
        spec.to_string(),
        @"SELECT good_info.* FROM good_infos AS good_info, good_types AS good_type WHERE ((good_info.type_id = good_type.id) AND (good_type.id = 3)) ORDER BY good_info.sort DESC"
    );
}

#[test]
fn test_spec_serializes_to_json() {
    let info = good_info();
    let spec = QueryBuilder::from(&info)
        .filter(info.field_ref("id").unwrap().eq(1).unwrap())
        .build()
        .unwrap();
    let json = spec.to_json();
    assert_eq!(json["sources"][0]["name"], "good_info");
    let back: QuerySpec = serde_json::from_value(json).unwrap();
    assert_eq!(back, spec);
}
