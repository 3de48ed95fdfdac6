//! End-to-end execution tests against the in-memory store.

use quarry::expr::count_star;
use quarry::prelude::*;

fn student() -> EntityDescriptor {
    EntityDescriptor::builder("student", "t_student")
        .field("id", SemanticType::Integer, "id")
        .field("name", SemanticType::Text, "name")
        .field("score", SemanticType::Float, "score")
        .build()
        .unwrap()
}

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

fn student_store(desc: &EntityDescriptor) -> MemoryStore {
    let mut store = MemoryStore::new();
    let rows: [(i64, &str, f64); 4] = [
        (1, "kevin", 70.0),
        (2, "mary", 85.0),
        (3, "henry", 85.0),
        (4, "tom", 90.0),
    ];
    for (id, name, score) in rows {
        store
            .insert(
                desc,
                [
                    ("id", Value::Int(id)),
                    ("name", name.into()),
                    ("score", Value::Float(score)),
                ],
            )
            .unwrap();
    }
    store
}

fn goods_store(info: &EntityDescriptor, types: &EntityDescriptor) -> MemoryStore {
    let mut store = MemoryStore::new();
    for (id, name) in [(1, "food"), (2, "toy"), (3, "book")] {
        store
            .insert(types, [("id", Value::Int(id)), ("name", name.into())])
            .unwrap();
    }
    let goods: [(i64, &str, f64, i64, i64); 4] = [
        (1, "rust in action", 59.0, 3, 2),
        (2, "tokio guide", 39.0, 3, 5),
        (3, "teddy bear", 19.0, 2, 1),
        (4, "chess set", 29.0, 2, 4),
    ];
    for (id, title, price, type_id, sort) in goods {
        store
            .insert(
                info,
                [
                    ("id", Value::Int(id)),
                    ("title", title.into()),
                    ("price", Value::Float(price)),
                    ("type_id", Value::Int(type_id)),
                    ("sort", Value::Int(sort)),
                ],
            )
            .unwrap();
    }
    store
}

fn titles(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.get_text("title").unwrap()).collect()
}

#[test]
fn test_two_source_join_with_ordering() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);

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

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(titles(&rows), vec!["tokio guide", "rust in action"]);
}

#[test]
fn test_multi_key_ordering_is_stable() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);

    // type_id desc, then price asc within each type.
    let spec = QueryBuilder::from(&info)
        .order_by(&info.field_ref("type_id").unwrap(), SortDir::Desc)
        .order_by(&info.field_ref("price").unwrap(), SortDir::Asc)
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(
        titles(&rows),
        vec!["tokio guide", "rust in action", "teddy bear", "chess set"]
    );
}

#[test]
fn test_aggregates_over_all_rows() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let engine = Engine::new(&store);
    let price = info.field_ref("price").unwrap();

    let count = QueryBuilder::from(&info)
        .select(vec![count_star()])
        .build()
        .unwrap();
    assert_eq!(engine.scalar(&count).unwrap(), Value::Int(4));

    let sum = QueryBuilder::from(&info)
        .select(vec![price.sum().unwrap()])
        .build()
        .unwrap();
    assert_eq!(engine.scalar(&sum).unwrap(), Value::Float(146.0));

    let avg = QueryBuilder::from(&info)
        .select(vec![price.avg().unwrap()])
        .build()
        .unwrap();
    assert_eq!(engine.scalar(&avg).unwrap(), Value::Float(36.5));

    let max = QueryBuilder::from(&info)
        .select(vec![price.max()])
        .build()
        .unwrap();
    assert_eq!(engine.scalar(&max).unwrap(), Value::Float(59.0));
}

#[test]
fn test_group_by_with_having() {
    let desc = student();
    let store = student_store(&desc);
    let score = desc.field_ref("score").unwrap();

    let spec = QueryBuilder::from(&desc)
        .select(vec![score.expr()])
        .group_by(&score)
        .having(score.gt(80).unwrap())
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    let scores: Vec<f64> = rows.iter().map(|r| r.get_f64("score").unwrap()).collect();
    // Distinct passing scores, ascending by group key.
    assert_eq!(scores, vec![85.0, 90.0]);
}

#[test]
fn test_group_by_with_aggregate_per_group() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let type_id = info.field_ref("type_id").unwrap();
    let price = info.field_ref("price").unwrap();

    let spec = QueryBuilder::from(&info)
        .select(vec![
            ProjectionBinding::from(type_id.expr()),
            ProjectionBinding::from(count_star()).with_alias("n"),
            ProjectionBinding::from(price.sum().unwrap()).with_alias("total"),
        ])
        .group_by(&type_id)
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_i64("type_id").unwrap(), 2);
    assert_eq!(rows[0].get_i64("n").unwrap(), 2);
    assert_eq!(rows[0].get_f64("total").unwrap(), 48.0);
    assert_eq!(rows[1].get_i64("type_id").unwrap(), 3);
    assert_eq!(rows[1].get_f64("total").unwrap(), 98.0);
}

#[test]
fn test_count_over_empty_input_is_zero() {
    let info = good_info();
    let store = MemoryStore::new();
    let spec = QueryBuilder::from(&info)
        .select(vec![count_star()])
        .build()
        .unwrap();
    assert_eq!(Engine::new(&store).scalar(&spec).unwrap(), Value::Int(0));
}

#[test]
fn test_in_subquery() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);

    let book_type_ids = QueryBuilder::from(&types)
        .select(vec![types.field_ref("id").unwrap().expr()])
        .filter(types.field_ref("name").unwrap().eq("book").unwrap())
        .build()
        .unwrap();

    let spec = QueryBuilder::from(&info)
        .filter(info.field_ref("type_id").unwrap().in_subquery(book_type_ids))
        .build()
        .unwrap();

    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert_eq!(titles(&rows), vec!["rust in action", "tokio guide"]);
}

#[test]
fn test_scalar_subquery_comparisons() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let price = info.field_ref("price").unwrap();

    let max_price = QueryBuilder::from(&info)
        .select(vec![price.max()])
        .build()
        .unwrap();
    let most_expensive = QueryBuilder::from(&info)
        .filter(price.eq_subquery(max_price))
        .build()
        .unwrap();
    let rows: Vec<Row> = Engine::new(&store).fetch(&most_expensive).unwrap();
    assert_eq!(titles(&rows), vec!["rust in action"]);

    let avg_price = QueryBuilder::from(&info)
        .select(vec![price.avg().unwrap()])
        .build()
        .unwrap();
    let above_average = QueryBuilder::from(&info)
        .filter(price.gt_subquery(avg_price))
        .build()
        .unwrap();
    let rows: Vec<Row> = Engine::new(&store).fetch(&above_average).unwrap();
    assert_eq!(titles(&rows), vec!["rust in action", "tokio guide"]);
}

#[test]
fn test_fetch_one_cardinality() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let engine = Engine::new(&store);

    let one = QueryBuilder::from(&info)
        .filter(info.field_ref("id").unwrap().eq(1).unwrap())
        .build()
        .unwrap();
    let row: Option<Row> = engine.fetch_one(&one).unwrap();
    assert_eq!(row.unwrap().get_text("title").unwrap(), "rust in action");

    let none = QueryBuilder::from(&info)
        .filter(info.field_ref("id").unwrap().eq(999).unwrap())
        .build()
        .unwrap();
    assert_eq!(engine.fetch_one::<Row>(&none).unwrap(), None);

    let many = QueryBuilder::from(&info).build().unwrap();
    assert!(matches!(
        engine.fetch_one::<Row>(&many),
        Err(QueryError::Cardinality(CardinalityError::MultipleRows))
    ));
}

#[test]
fn test_scalar_requires_single_expression() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let engine = Engine::new(&store);

    let two_wide = QueryBuilder::from(&info)
        .select(vec![
            info.field_ref("price").unwrap().sum().unwrap(),
            info.field_ref("price").unwrap().avg().unwrap(),
        ])
        .build()
        .unwrap();
    assert!(matches!(
        engine.scalar(&two_wide),
        Err(QueryError::InvalidQuery(InvalidQueryError::NotScalar(2)))
    ));
}

#[test]
fn test_limit_zero_yields_no_rows() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let spec = QueryBuilder::from(&info).limit(0).build().unwrap();
    let rows: Vec<Row> = Engine::new(&store).fetch(&spec).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_rows_are_lazy_and_restart_by_reexecution() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let engine = Engine::new(&store);
    let spec = QueryBuilder::from(&info).build().unwrap();

    let mut rows = engine.rows(&spec).unwrap();
    assert!(rows.next().is_some());
    let remaining = rows.count();
    assert_eq!(remaining, 3);

    // A fresh call re-executes from the top.
    assert_eq!(engine.rows(&spec).unwrap().count(), 4);
}

#[test]
fn test_division_by_zero_is_an_execution_error() {
    let info = good_info();
    let types = good_type();
    let store = goods_store(&info, &types);
    let price = info.field_ref("price").unwrap();

    let spec = QueryBuilder::from(&info)
        .select(vec![Expr::Binary {
            left: Box::new(price.expr()),
            op: quarry::expr::BinaryOp::Div,
            right: Box::new(Expr::Literal(Value::Float(0.0))),
        }])
        .build()
        .unwrap();

    let result: QueryResult<Vec<Row>> = Engine::new(&store).fetch(&spec);
    assert!(matches!(result, Err(QueryError::Execution(_))));
}
