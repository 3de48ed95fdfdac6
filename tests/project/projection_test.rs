//! Tests for projection mapping into rows and DTO shapes.

use quarry::prelude::*;

fn good_info() -> EntityDescriptor {
    EntityDescriptor::builder("good_info", "good_infos")
        .field("id", SemanticType::Integer, "id")
        .field("title", SemanticType::Text, "title")
        .field("price", SemanticType::Float, "price")
        .field("type_id", SemanticType::Integer, "type_id")
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

fn good_dto() -> DtoShape {
    DtoShape::new("good_dto", ["id", "title", "price", "type_name"])
}

/// The caller-side target type, built through [`FromRow`].
#[derive(Debug, PartialEq)]
struct GoodDto {
    id: i64,
    title: String,
    price: f64,
    type_name: Option<String>,
}

impl FromRow for GoodDto {
    fn from_row(row: &Row) -> Result<Self, ProjectionError> {
        Ok(GoodDto {
            id: row.get_i64("id")?,
            title: row.get_text("title")?,
            price: row.get_f64("price")?,
            type_name: row.opt_text("type_name")?,
        })
    }
}

fn seeded_store(info: &EntityDescriptor, types: &EntityDescriptor) -> MemoryStore {
    let mut store = MemoryStore::new();
    for (id, name) in [(1, "food"), (2, "toy"), (3, "book")] {
        store
            .insert(types, [("id", Value::Int(id)), ("name", name.into())])
            .unwrap();
    }
    let goods: [(i64, &str, f64, i64); 3] = [
        (1, "rust in action", 59.0, 3),
        (2, "tokio guide", 39.0, 3),
        (3, "teddy bear", 19.0, 2),
    ];
    for (id, title, price, type_id) in goods {
        store
            .insert(
                info,
                [
                    ("id", Value::Int(id)),
                    ("title", title.into()),
                    ("price", Value::Float(price)),
                    ("type_id", Value::Int(type_id)),
                ],
            )
            .unwrap();
    }
    store
}

#[test]
fn test_entity_projection_round_trip() {
    let info = good_info();
    let types = good_type();
    let store = seeded_store(&info, &types);
    let spec = QueryBuilder::from(&info)
        .filter(info.field_ref("id").unwrap().eq(1).unwrap())
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    // Columns carry logical field names in declaration order.
    assert_eq!(row.columns()[0].0, "id");
    assert_eq!(row.get_text("title").unwrap(), "rust in action");
    assert_eq!(row.get_f64("price").unwrap(), 59.0);
}

#[test]
fn test_dto_projection_with_cross_entity_aliases() {
    let info = good_info();
    let types = good_type();
    let store = seeded_store(&info, &types);

    let spec = QueryBuilder::from_all([&info, &types])
        .select_into(
            good_dto(),
            vec![
                ProjectionBinding::from(&info.field_ref("id").unwrap()),
                ProjectionBinding::from(&info.field_ref("title").unwrap()),
                ProjectionBinding::from(&info.field_ref("price").unwrap()),
                ProjectionBinding::from(&types.field_ref("name").unwrap()).with_alias("type_name"),
            ],
        )
        .filter(
            info.field_ref("type_id")
                .unwrap()
                .eq_field(&types.field_ref("id").unwrap())
                .unwrap(),
        )
        .filter(types.field_ref("id").unwrap().eq(3).unwrap())
        .build()
        .unwrap();

    let dtos: Vec<GoodDto> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(
        dtos,
        vec![
            GoodDto {
                id: 1,
                title: "rust in action".into(),
                price: 59.0,
                type_name: Some("book".into()),
            },
            GoodDto {
                id: 2,
                title: "tokio guide".into(),
                price: 39.0,
                type_name: Some("book".into()),
            },
        ]
    );
}

#[test]
fn test_unbound_dto_fields_are_null() {
    let info = good_info();
    let types = good_type();
    let store = seeded_store(&info, &types);

    // Only three of the four shape fields are fed.
    let spec = QueryBuilder::from(&info)
        .select_into(
            good_dto(),
            vec![
                ProjectionBinding::from(&info.field_ref("id").unwrap()),
                ProjectionBinding::from(&info.field_ref("title").unwrap()),
                ProjectionBinding::from(&info.field_ref("price").unwrap()),
            ],
        )
        .filter(info.field_ref("id").unwrap().eq(3).unwrap())
        .build()
        .unwrap();

    let dtos: Vec<GoodDto> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(dtos.len(), 1);
    assert_eq!(dtos[0].type_name, None);
    assert_eq!(dtos[0].title, "teddy bear");
}

#[test]
fn test_unknown_alias_fails_at_mapping() {
    let info = good_info();
    let types = good_type();
    let store = seeded_store(&info, &types);

    let spec = QueryBuilder::from(&info)
        .select_into(
            DtoShape::new("tiny", ["id"]),
            vec![ProjectionBinding::from(&info.field_ref("id").unwrap()).with_alias("nope")],
        )
        .filter(info.field_ref("id").unwrap().eq(1).unwrap())
        .build()
        .unwrap();

    let result: QueryResult<Vec<Row>> = Engine::new(&store).fetch(&spec);
    assert!(matches!(
        result,
        Err(QueryError::Projection(ProjectionError::UnknownTarget { .. }))
    ));
}

#[test]
fn test_expression_projection_labels() {
    let info = good_info();
    let types = good_type();
    let store = seeded_store(&info, &types);

    let price = info.field_ref("price").unwrap();
    let spec = QueryBuilder::from(&info)
        .select(vec![
            ProjectionBinding::from(price.sum().unwrap()),
            ProjectionBinding::from(price.avg().unwrap()).with_alias("mean"),
        ])
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_f64("sum_price").unwrap(), 117.0);
    assert_eq!(rows[0].get_f64("mean").unwrap(), 39.0);
}

#[test]
fn test_typed_accessors_check_value_types() {
    let row = Row::new(vec![
        ("id".into(), Value::Int(7)),
        ("title".into(), Value::Text("x".into())),
    ]);
    assert_eq!(row.get_i64("id").unwrap(), 7);
    assert!(matches!(
        row.get_i64("title"),
        Err(ProjectionError::ValueType { .. })
    ));
    assert!(matches!(
        row.get_text("missing"),
        Err(ProjectionError::MissingColumn(_))
    ));
}
