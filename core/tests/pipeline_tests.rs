//! End-to-end tests for batch pipelines

mod common;

use common::{car_sales_lines, create_test_context, lines, sales_lines, totals};
use tally_common::TallyConfig;
use tally_core::{
    AggregateSpec, Combiner, ConversionPolicy, Dataset, Key, Output, Pipeline, Predicate,
    RecordFormat, Source, TallyContext, TallyError,
};

fn sum_by_product() -> Pipeline {
    Pipeline::builder().sum_by([0], 2).build().unwrap()
}

#[test]
fn test_sum_per_key() {
    let ctx = create_test_context("sum_per_key", 2);
    let result = sum_by_product()
        .collect(&ctx, &Source::Lines(sales_lines()))
        .unwrap();
    assert_eq!(
        result.output.totals().unwrap(),
        totals(&[("A", 17), ("B", 5)]).as_slice()
    );
    assert_eq!(result.stats.lines_read, 3);
    assert_eq!(result.stats.dropped(), 0);
}

#[test]
fn test_top_one() {
    let ctx = create_test_context("top_one", 2);
    let pipeline = Pipeline::builder().sum_by([0], 2).top(1).build().unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(sales_lines())).unwrap();
    assert_eq!(result.output, Output::Ranked(totals(&[("A", 17)])));
}

#[test]
fn test_short_record_is_dropped() {
    let ctx = create_test_context("short_record", 2);
    let mut input = sales_lines();
    input.push("C,1".to_string());
    let result = sum_by_product().collect(&ctx, &Source::Lines(input)).unwrap();
    assert_eq!(
        result.output.totals().unwrap(),
        totals(&[("A", 17), ("B", 5)]).as_slice()
    );
    assert_eq!(result.stats.malformed, 1);
}

#[test]
fn test_non_numeric_values_are_excluded() {
    let ctx = create_test_context("non_numeric", 3);
    let input = lines(&["A,1,10", "A,1,ten", "B,1,", "B,1,5", "A,1,1.5"]);
    let result = sum_by_product().collect(&ctx, &Source::Lines(input)).unwrap();
    assert_eq!(
        result.output.totals().unwrap(),
        totals(&[("A", 10), ("B", 5)]).as_slice()
    );
    assert_eq!(result.stats.unparseable, 3);
}

#[test]
fn test_conversion_failure_aborts_when_asked() {
    let ctx = create_test_context("conversion_fail", 2);
    let pipeline = Pipeline::builder()
        .aggregate(AggregateSpec::sum([0], 2).with_conversion(ConversionPolicy::Fail))
        .build()
        .unwrap();
    let err = pipeline
        .collect(&ctx, &Source::lines(["A,1,10", "A,1,ten"]))
        .unwrap_err();
    assert!(matches!(err, TallyError::Conversion { ref value } if value == "ten"));
}

#[test]
fn test_result_is_bounded_and_sorted() {
    let ctx = create_test_context("bounded", 4);
    let input: Vec<String> = (0..200)
        .map(|i| format!("k{},x,{}", i % 13, (i * 7) % 11))
        .collect();
    for n in [1, 5, 13, 50] {
        let pipeline = Pipeline::builder().sum_by([0], 2).top(n).build().unwrap();
        let result = pipeline.collect(&ctx, &Source::Lines(input.clone())).unwrap();
        let rows = result.output.totals().unwrap();
        assert!(rows.len() <= n);
        assert!(rows.windows(2).all(|pair| pair[0].1 >= pair[1].1));
    }
}

#[test]
fn test_partitioning_does_not_change_result() {
    let ctx = create_test_context("partitioning", 3);
    let input: Vec<String> = (0..97)
        .map(|i| format!("{},{},{}", ["x", "y", "z", "w"][i % 4], i, i * 3))
        .collect();
    let pipeline = Pipeline::builder().sum_by([0], 2).build().unwrap();

    let single = pipeline
        .collect_dataset(&ctx, &Dataset::from_lines(input.clone()))
        .unwrap();
    for partitions in 1..=7 {
        let dataset = Dataset::from_lines_with_partitions(input.clone(), partitions);
        let result = pipeline.collect_dataset(&ctx, &dataset).unwrap();
        assert_eq!(result.output, single.output, "partitions = {}", partitions);
    }
}

#[test]
fn test_permuting_input_does_not_change_result() {
    let ctx = create_test_context("permutation", 2);
    let input: Vec<String> = (0..40).map(|i| format!("k{},_,{}", i % 6, i)).collect();
    let mut reversed = input.clone();
    reversed.reverse();
    let mut interleaved: Vec<String> = input.iter().step_by(2).cloned().collect();
    interleaved.extend(input.iter().skip(1).step_by(2).cloned());

    let pipeline = Pipeline::builder().sum_by([0], 2).build().unwrap();
    let expected = pipeline.collect(&ctx, &Source::Lines(input)).unwrap().output;
    for permuted in [reversed, interleaved] {
        let output = pipeline.collect(&ctx, &Source::Lines(permuted)).unwrap().output;
        assert_eq!(output, expected);
    }
}

#[test]
fn test_top_products_by_occurrence() {
    let ctx = create_test_context("occurrence", 2);
    let pipeline = Pipeline::builder().count_by([0]).top(2).build().unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("Civic", 3), ("Prius", 2)]).as_slice());
}

#[test]
fn test_composite_key_model_by_country() {
    let ctx = create_test_context("composite", 2);
    let pipeline = Pipeline::builder().count_by([0, 3]).top(1).build().unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    assert_eq!(
        result.output.totals().unwrap(),
        &[(Key::from(vec!["Civic", "US"]), 2)]
    );
}

#[test]
fn test_remove_records_without_state() {
    let ctx = create_test_context("non_empty", 2);
    let pipeline = Pipeline::builder()
        .filter(Predicate::NonEmpty { field: 4 })
        .count_by([3])
        .build()
        .unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("US", 4)]).as_slice());
    assert_eq!(result.stats.filtered, 3);
}

#[test]
fn test_distinct_values_through_count() {
    let ctx = create_test_context("distinct", 2);
    let pipeline = Pipeline::builder().count_by([1]).build().unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    let makes: Vec<String> = result
        .output
        .totals()
        .unwrap()
        .iter()
        .map(|(key, _)| key.to_string())
        .collect();
    assert_eq!(makes, vec!["Ford", "Honda", "Toyota", "VW"]);
}

#[test]
fn test_regroup_counts_states_per_country() {
    let ctx = create_test_context("regroup", 2);
    let pipeline = Pipeline::builder()
        .filter(Predicate::NonEmpty { field: 4 })
        .count_by([3, 4])
        .regroup([0], Combiner::Count)
        .build()
        .unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("US", 3)]).as_slice());
}

#[test]
fn test_range_filter_on_year() {
    let ctx = create_test_context("year_range", 2);
    let pipeline = Pipeline::builder()
        .filter(Predicate::IntRange {
            field: 2,
            min: 2000,
            max: 2010,
        })
        .select([0])
        .build()
        .unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    let models: Vec<&str> = result
        .output
        .records()
        .unwrap()
        .iter()
        .map(|record| record.fields()[0].as_str())
        .collect();
    assert_eq!(models, vec!["Civic", "Civic", "Prius", "Golf", "Prius"]);
}

#[test]
fn test_projection_limit_keeps_input_order() {
    let ctx = create_test_context("projection_limit", 3);
    let pipeline = Pipeline::builder().select([3, 0]).limit(2).build().unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(car_sales_lines())).unwrap();
    let rows = result.output.to_rows();
    assert_eq!(rows, vec![vec!["US", "Civic"], vec!["Japan", "Civic"]]);
}

#[test]
fn test_csv_directory_with_headers() {
    let ctx = create_test_context("csv_dir", 2);
    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "part-0.csv", "product,qty,amount\nA,1,10\nB,1,5\n");
    common::write_file(dir.path(), "part-1.csv", "product,qty,amount\nA,1,7\n");
    common::write_file(dir.path(), "_SUCCESS", "");

    let pipeline = Pipeline::builder()
        .skip_header(true)
        .sum_by([0], 2)
        .top(10)
        .build()
        .unwrap();
    let result = pipeline.collect(&ctx, &Source::path(dir.path())).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("A", 17), ("B", 5)]).as_slice());
}

#[test]
fn test_json_lines_by_column_name() {
    let ctx = create_test_context("json_lines", 2);
    let pipeline = Pipeline::builder()
        .format(RecordFormat::json_lines(["ticker", "units_sold"]))
        .sum_by([0], 1)
        .top(1)
        .build()
        .unwrap();
    let input = Source::lines([
        r#"{"ticker": "ABC", "units_sold": 4}"#,
        r#"{"ticker": "XYZ", "units_sold": 3}"#,
        r#"{"ticker": "ABC", "units_sold": 2}"#,
        r#"not json"#,
    ]);
    let result = pipeline.collect(&ctx, &input).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("ABC", 6)]).as_slice());
    assert_eq!(result.stats.malformed, 1);
}

#[test]
fn test_pipeline_from_json_description() {
    let ctx = create_test_context("json_pipeline", 2);
    let pipeline = Pipeline::from_json(
        r#"{
            "stages": [
                {"aggregate": {"key_fields": [0], "value": {"field": 2}, "combiner": "max"}},
                "sort"
            ]
        }"#,
    )
    .unwrap();
    let result = pipeline.collect(&ctx, &Source::Lines(sales_lines())).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("A", 10), ("B", 5)]).as_slice());
}

#[test]
fn test_unset_format_uses_context_delimiter() {
    let config = TallyConfig::builder()
        .app_name("pipe_delimited")
        .master("local[2]")
        .default_delimiter('|')
        .build()
        .unwrap();
    let ctx = TallyContext::init(config).unwrap();
    let input = Source::lines(["A|1|10", "B|1|5", "A|1|7"]);

    let pipeline = Pipeline::from_json(r#"{"stages": [{"aggregate": {"key_fields": [0], "value": {"field": 2}, "combiner": "sum"}}]}"#)
        .unwrap();
    assert!(pipeline.format().is_none());
    let result = pipeline.collect(&ctx, &input).unwrap();
    assert_eq!(result.output.totals().unwrap(), totals(&[("A", 17), ("B", 5)]).as_slice());

    let comma = Pipeline::builder().delimiter(',').sum_by([0], 2).build().unwrap();
    let result = comma.collect(&ctx, &input).unwrap();
    assert!(result.output.is_empty());
    assert_eq!(result.stats.malformed, 3);
}
