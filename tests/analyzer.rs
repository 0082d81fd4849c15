use orcinus::analyzer::{Analyzer, AnalyzerError, AnalyzerRule, IllegalAggregation};
use orcinus::catalog::{Catalog, CatalogError};
use orcinus::expression::{
    AggregateFunction, AttributeRef, BinaryOp, Expression, FunctionArgs, FunctionCall, SortOrder,
    WindowCall, WindowSpec,
};
use orcinus::plan::LogicalPlan;
use orcinus::types::Type;

fn catalog() -> Catalog {
    let mut catalog = Catalog::default();
    catalog
        .add_relation(
            "t",
            ["a", "b", "x", "y", "z"]
                .map(|name| AttributeRef::new(name, Type::Integer, false))
                .to_vec(),
        )
        .unwrap();
    catalog
        .add_relation(
            "pairs",
            ["a", "b"]
                .map(|name| AttributeRef::new(name, Type::Integer, false))
                .to_vec(),
        )
        .unwrap();
    catalog
}

fn analyze(plan: LogicalPlan) -> Result<LogicalPlan, AnalyzerError> {
    Analyzer::new(catalog()).analyze(plan)
}

fn table(name: &str) -> LogicalPlan {
    LogicalPlan::UnresolvedRelation(name.to_owned())
}

fn col(name: &str) -> Expression {
    Expression::column(name)
}

fn call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::Function(FunctionCall {
        name: name.to_owned(),
        args: FunctionArgs::Expressions(args),
        is_distinct: false,
    })
}

fn contains_unresolved_aggregate(plan: &LogicalPlan) -> bool {
    matches!(plan, LogicalPlan::UnresolvedAggregate(_))
        || plan.children().iter().any(|c| contains_unresolved_aggregate(c))
}

fn expect_illegal(result: Result<LogicalPlan, AnalyzerError>) -> IllegalAggregation {
    match result {
        Err(AnalyzerError::IllegalAggregation(e)) => e,
        other => panic!("expected IllegalAggregation, got {other:?}"),
    }
}

#[test]
fn distinct_becomes_group_by_all_columns() {
    let catalog = catalog();
    let source_output = catalog.lookup_relation("pairs").unwrap().output();

    let analyzed = Analyzer::new(catalog)
        .analyze(table("pairs").distinct())
        .unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Aggregate(agg) = *project.input else {
        panic!("expected Aggregate under Project");
    };
    assert!(agg.aggregates.is_empty());
    assert_eq!(agg.keys.len(), 2);
    for (alias, attr) in agg.keys.iter().zip(&source_output) {
        assert_eq!(alias.child, Expression::Attribute(attr.clone()));
        assert!(alias.attr.internal);
    }

    // Output names and ids are the source columns' own.
    assert_eq!(project.project_list.len(), 2);
    for (item, attr) in project.project_list.iter().zip(&source_output) {
        let output = item.output_attribute().unwrap();
        assert_eq!(output.name, attr.name);
        assert_eq!(output.id, attr.id);
        assert!(!output.internal);
    }
}

#[test]
fn projection_with_aggregate_becomes_global_aggregation() {
    let plan = table("t").project(vec![call("count", vec![col("x")]).alias("c")]);
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Aggregate(agg) = *project.input else {
        panic!("expected Aggregate under Project");
    };
    assert!(agg.keys.is_empty());
    assert_eq!(agg.aggregates.len(), 1);
    let Expression::Aggregate(counted) = &agg.aggregates[0].child else {
        panic!("expected an aggregate call");
    };
    assert_eq!(counted.function, AggregateFunction::Count);

    let [Expression::Alias(alias)] = project.project_list.as_slice() else {
        panic!("expected a single aliased output");
    };
    assert_eq!(alias.name, "c");
    assert_eq!(alias.child, Expression::Attribute(agg.aggregates[0].attr.clone()));
}

#[test]
fn having_and_order_by_layer_above_the_aggregation() {
    // SELECT count(x) AS c FROM t GROUP BY y HAVING max(z) > 0 ORDER BY y DESC
    let plan = table("t")
        .aggregate(
            vec![col("y")],
            vec![call("count", vec![col("x")]).alias("c")],
        )
        .filter(call("max", vec![col("z")]).gt(Expression::literal(0i64)))
        .sort(vec![SortOrder::desc(col("y"))]);
    let analyzed = analyze(plan).unwrap();
    assert!(!contains_unresolved_aggregate(&analyzed));

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Sort(sort) = *project.input else {
        panic!("expected Sort under Project");
    };
    let LogicalPlan::Filter(filter) = *sort.input else {
        panic!("expected Filter under Sort");
    };
    let LogicalPlan::Aggregate(agg) = *filter.input else {
        panic!("expected Aggregate under Filter");
    };

    assert_eq!(agg.keys.len(), 1);
    assert_eq!(agg.keys[0].child.to_string(), "y");
    assert_eq!(agg.aggregates.len(), 2);
    assert_eq!(agg.aggregates[0].child.to_string(), "count(x)");
    assert_eq!(agg.aggregates[1].child.to_string(), "max(z)");

    // HAVING filters on the max(z) attribute, before the projection.
    let Expression::BinaryOp { op, lhs, .. } = &filter.condition else {
        panic!("expected a comparison");
    };
    assert_eq!(*op, BinaryOp::Gt);
    assert_eq!(**lhs, Expression::Attribute(agg.aggregates[1].attr.clone()));

    // ORDER BY the grouping attribute, descending.
    assert_eq!(sort.order.len(), 1);
    assert_eq!(
        sort.order[0].expr,
        Expression::Attribute(agg.keys[0].attr.clone())
    );

    let [Expression::Alias(alias)] = project.project_list.as_slice() else {
        panic!("expected a single aliased output");
    };
    assert_eq!(alias.name, "c");
    assert_eq!(alias.child, Expression::Attribute(agg.aggregates[0].attr.clone()));
}

#[test]
fn ungrouped_column_in_select_is_rejected() {
    let plan = table("t").aggregate(vec![col("y")], vec![col("z")]);
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::DanglingReference {
            component,
            attribute,
            keys,
            ..
        } => {
            assert_eq!(component, "SELECT field");
            assert_eq!(attribute, "z");
            assert_eq!(keys, "y");
        }
        other => panic!("expected DanglingReference, got {other:?}"),
    }
}

#[test]
fn aggregate_in_grouping_key_is_rejected() {
    let plan = table("t").aggregate(vec![call("count", vec![col("x")])], vec![col("y")]);
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::AggregateInGroupingKey { key, aggregate } => {
            assert_eq!(key, "count(x)");
            assert_eq!(aggregate, "count(x)");
        }
        other => panic!("expected AggregateInGroupingKey, got {other:?}"),
    }
}

#[test]
fn window_aggregate_stays_analytic() {
    // SELECT max(a) OVER (PARTITION BY avg(b)), max(a) FROM t GROUP BY a
    let window = Expression::Window(Box::new(WindowCall {
        function: call("max", vec![col("a")]),
        spec: WindowSpec {
            partition_by: vec![call("avg", vec![col("b")])],
            ..Default::default()
        },
    }));
    let plan = table("t").aggregate(
        vec![col("a")],
        vec![window, call("max", vec![col("a")])],
    );
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Window(window) = *project.input else {
        panic!("expected one Window layer");
    };
    let LogicalPlan::Aggregate(agg) = *window.input else {
        panic!("expected Aggregate under Window");
    };

    // avg(b) is collected as an ordinary aggregate, and so is the
    // standalone max; the window operand is not.
    assert_eq!(agg.keys.len(), 1);
    assert_eq!(agg.aggregates.len(), 2);
    assert_eq!(agg.aggregates[0].child.to_string(), "avg(b)");
    let Expression::Aggregate(standalone) = &agg.aggregates[1].child else {
        panic!("expected the standalone max to be aliased");
    };
    assert_eq!(standalone.function, AggregateFunction::Max);
    assert_eq!(
        standalone.args[0],
        Expression::Attribute(agg.keys[0].attr.clone())
    );

    // The window operand survived as a real aggregate call over the key
    // attribute, partitioned by the avg(b) attribute.
    assert_eq!(window.functions.len(), 1);
    let Expression::Window(call) = &window.functions[0].child else {
        panic!("expected a window expression");
    };
    let Expression::Aggregate(operand) = &call.function else {
        panic!("window operand must stay an aggregate call");
    };
    assert_eq!(operand.function, AggregateFunction::Max);
    assert_eq!(
        operand.args[0],
        Expression::Attribute(agg.keys[0].attr.clone())
    );
    assert_eq!(
        call.spec.partition_by,
        vec![Expression::Attribute(agg.aggregates[0].attr.clone())]
    );

    assert_eq!(project.project_list.len(), 2);
}

#[test]
fn shared_aggregates_are_aliased_once() {
    // The same count(x) in SELECT and HAVING produces a single alias.
    let plan = table("t")
        .aggregate(
            vec![col("y")],
            vec![call("count", vec![col("x")]).alias("c")],
        )
        .filter(call("count", vec![col("x")]).gt(Expression::literal(1i64)));
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Filter(filter) = *project.input else {
        panic!("expected Filter under Project");
    };
    let LogicalPlan::Aggregate(agg) = *filter.input else {
        panic!("expected Aggregate under Filter");
    };
    assert_eq!(agg.aggregates.len(), 1);
}

#[test]
fn order_by_select_alias_binds_to_the_aggregate() {
    let plan = table("t")
        .aggregate(
            vec![col("y")],
            vec![call("count", vec![col("x")]).alias("c")],
        )
        .sort(vec![SortOrder::asc(col("c"))]);
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Sort(sort) = *project.input else {
        panic!("expected Sort under Project");
    };
    let LogicalPlan::Aggregate(agg) = *sort.input else {
        panic!("expected Aggregate under Sort");
    };
    assert_eq!(
        sort.order[0].expr,
        Expression::Attribute(agg.aggregates[0].attr.clone())
    );
}

#[test]
fn only_the_sort_adjacent_to_the_aggregation_survives() {
    let plan = table("t")
        .aggregate(vec![col("y")], vec![col("y")])
        .sort(vec![SortOrder::asc(col("y"))])
        .sort(vec![SortOrder::desc(col("y"))]);
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Sort(sort) = *project.input else {
        panic!("expected a single Sort");
    };
    assert_eq!(sort.order.len(), 1);
    assert_eq!(sort.order[0].order, orcinus::expression::Order::Asc);
    assert!(matches!(*sort.input, LogicalPlan::Aggregate(_)));
}

#[test]
fn stacked_filters_conjoin_in_having() {
    let plan = table("t")
        .aggregate(vec![col("y")], vec![col("y")])
        .filter(call("max", vec![col("z")]).gt(Expression::literal(0i64)))
        .filter(call("min", vec![col("z")]).gt(Expression::literal(-5i64)));
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Filter(filter) = *project.input else {
        panic!("expected Filter under Project");
    };
    assert!(matches!(
        filter.condition,
        Expression::BinaryOp {
            op: BinaryOp::And,
            ..
        }
    ));
}

#[test]
fn having_reference_to_a_select_alias_binds_to_the_aggregate() {
    // HAVING may refer to a projected output by its alias; the bound
    // condition filters on the underlying aggregate attribute.
    let plan = table("t")
        .aggregate(
            vec![col("y")],
            vec![call("count", vec![col("x")]).alias("c")],
        )
        .filter(col("c").gt(Expression::literal(1i64)));
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Filter(filter) = *project.input else {
        panic!("expected Filter under Project");
    };
    let LogicalPlan::Aggregate(agg) = *filter.input else {
        panic!("expected Aggregate under Filter");
    };
    assert_eq!(agg.aggregates.len(), 1);
    let Expression::BinaryOp { lhs, .. } = &filter.condition else {
        panic!("expected a comparison");
    };
    assert_eq!(**lhs, Expression::Attribute(agg.aggregates[0].attr.clone()));
}

#[test]
fn having_reference_to_a_windowed_select_alias_is_rejected() {
    // `w` names a window computation; HAVING runs before windows, so
    // referring to it through the alias is just as illegal as writing
    // the window call inline.
    let window = Expression::Window(Box::new(WindowCall {
        function: call("max", vec![col("a")]),
        spec: WindowSpec::default(),
    }));
    let plan = table("t")
        .aggregate(vec![col("y")], vec![col("y"), window.alias("w")])
        .filter(col("w").gt(Expression::literal(0i64)));
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::WindowNotAllowed { clause, .. } => assert_eq!(clause, "HAVING"),
        other => panic!("expected WindowNotAllowed, got {other:?}"),
    }
}

#[test]
fn window_function_in_having_is_rejected() {
    let window = Expression::Window(Box::new(WindowCall {
        function: call("max", vec![col("z")]),
        spec: WindowSpec::default(),
    }));
    let plan = table("t")
        .aggregate(vec![col("y")], vec![col("y")])
        .filter(window.gt(Expression::literal(0i64)));
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::WindowNotAllowed { clause, .. } => assert_eq!(clause, "HAVING"),
        other => panic!("expected WindowNotAllowed, got {other:?}"),
    }
}

#[test]
fn window_function_in_grouping_key_is_rejected() {
    let window = Expression::Window(Box::new(WindowCall {
        function: call("max", vec![col("z")]),
        spec: WindowSpec::default(),
    }));
    let plan = table("t").aggregate(vec![window], vec![col("y")]);
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::WindowNotAllowed { clause, .. } => assert_eq!(clause, "GROUP BY"),
        other => panic!("expected WindowNotAllowed, got {other:?}"),
    }
}

#[test]
fn nested_aggregates_are_rejected() {
    let plan = table("t").aggregate(
        vec![col("y")],
        vec![call("sum", vec![call("max", vec![col("x")])])],
    );
    let err = expect_illegal(analyze(plan));
    match err {
        IllegalAggregation::NestedAggregate { outer, inner } => {
            assert_eq!(outer, "sum(max(x))");
            assert_eq!(inner, "max(x)");
        }
        other => panic!("expected NestedAggregate, got {other:?}"),
    }
}

#[test]
fn count_star_counts_rows() {
    let count_star = Expression::Function(FunctionCall {
        name: "count".to_owned(),
        args: FunctionArgs::Wildcard,
        is_distinct: false,
    });
    let plan = table("t").project(vec![count_star.alias("n")]);
    let analyzed = analyze(plan).unwrap();

    let LogicalPlan::Project(project) = analyzed else {
        panic!("expected Project on top");
    };
    let LogicalPlan::Aggregate(agg) = *project.input else {
        panic!("expected Aggregate under Project");
    };
    assert_eq!(agg.aggregates[0].child.to_string(), "count(1)");
}

#[test]
fn distinct_aggregates_are_unsupported() {
    let count_distinct = Expression::Function(FunctionCall {
        name: "count".to_owned(),
        args: FunctionArgs::Expressions(vec![col("x")]),
        is_distinct: true,
    });
    let plan = table("t").aggregate(vec![col("y")], vec![count_distinct]);
    assert!(matches!(
        analyze(plan),
        Err(AnalyzerError::DistinctAggregateUnsupported)
    ));
}

#[test]
fn distinct_on_a_scalar_function_is_rejected() {
    let upper_distinct = Expression::Function(FunctionCall {
        name: "upper".to_owned(),
        args: FunctionArgs::Expressions(vec![col("a")]),
        is_distinct: true,
    });
    let plan = table("t").project(vec![upper_distinct]);
    assert!(matches!(
        analyze(plan),
        Err(AnalyzerError::InvalidArgument(_))
    ));
}

#[test]
fn unknown_names_are_reported() {
    assert!(matches!(
        analyze(table("missing")),
        Err(AnalyzerError::Catalog(CatalogError::TableNotFound(_)))
    ));
    assert!(matches!(
        analyze(table("t").project(vec![call("frobnicate", vec![col("a")])])),
        Err(AnalyzerError::Catalog(CatalogError::FunctionNotFound(_)))
    ));
    assert!(matches!(
        analyze(table("t").aggregate(vec![col("y")], vec![call("sum", vec![col("a"), col("b")])])),
        Err(AnalyzerError::Catalog(CatalogError::Arity("sum")))
    ));
}

#[test]
fn function_lookup_is_case_insensitive() {
    let plan = table("t").project(vec![call("COUNT", vec![col("x")]).alias("c")]);
    assert!(analyze(plan).is_ok());
}

#[test]
fn ranking_function_requires_a_window() {
    let plan = table("t").project(vec![call("rank", vec![])]);
    assert!(matches!(
        analyze(plan),
        Err(AnalyzerError::WindowRequired(_))
    ));
}

#[test]
fn ambiguous_columns_are_rejected() {
    let mut catalog = catalog();
    catalog
        .add_relation(
            "dupes",
            vec![
                AttributeRef::new("v", Type::Integer, false),
                AttributeRef::new("v", Type::Integer, false),
            ],
        )
        .unwrap();
    let plan = table("dupes").filter(col("v").gt(Expression::literal(0i64)));
    assert!(matches!(
        Analyzer::new(catalog).analyze(plan),
        Err(AnalyzerError::AmbiguousColumn(_))
    ));
}

#[test]
fn analysis_is_idempotent() {
    let plan = table("t")
        .aggregate(
            vec![col("y")],
            vec![call("count", vec![col("x")]).alias("c")],
        )
        .filter(call("max", vec![col("z")]).gt(Expression::literal(0i64)))
        .sort(vec![SortOrder::desc(col("y"))]);
    let analyzed = analyze(plan).unwrap();
    let again = analyze(analyzed.clone()).unwrap();
    assert_eq!(again, analyzed);
}

#[test]
fn each_rule_is_idempotent_on_its_own_output() {
    use orcinus::analyzer::{absorb, aggregate, distinct};

    let catalog = catalog();
    let rules: Vec<Box<dyn AnalyzerRule>> = vec![
        Box::new(distinct::RewriteDistincts),
        Box::new(distinct::RewriteProjectsAsGlobalAggregates),
        Box::new(absorb::AbsorbHavingConditions),
        Box::new(absorb::AbsorbSorts),
        Box::new(aggregate::ResolveAggregates),
    ];
    let relation = catalog.lookup_relation("pairs").unwrap();
    let a = relation.output()[0].clone();
    let plans = vec![
        relation.clone().distinct(),
        relation.clone().project(vec![Expression::Aggregate(
            orcinus::expression::AggregateCall::new(
                AggregateFunction::Count,
                vec![Expression::Attribute(a.clone())],
            ),
        )
        .alias("c")]),
        relation
            .clone()
            .aggregate(
                vec![Expression::Attribute(a.clone())],
                vec![Expression::Attribute(a).alias("k")],
            )
            .filter(Expression::literal(true)),
    ];
    for rule in &rules {
        for plan in &plans {
            let once = rule.apply(plan.clone(), &catalog).unwrap();
            let twice = rule.apply(once.clone(), &catalog).unwrap();
            assert_eq!(twice, once, "rule {} is not idempotent", rule.name());
        }
    }
}

#[test]
fn no_internal_attributes_leak_from_the_top_projection() {
    let plan = table("t").aggregate(
        vec![col("y")],
        vec![col("y").alias("k"), call("sum", vec![col("x")]).alias("s")],
    );
    let analyzed = analyze(plan).unwrap();
    for attr in analyzed.output() {
        assert!(!attr.internal, "leaked internal attribute {}", attr.name);
    }
    assert_eq!(
        analyzed
            .output()
            .iter()
            .map(|attr| attr.name.as_str())
            .collect::<Vec<_>>(),
        vec!["k", "s"]
    );
}
