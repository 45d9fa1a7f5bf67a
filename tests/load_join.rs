mod common;

use std::path::Path;

use common::TestWorkspace;
use data_prep::{
    PrepError,
    join::{JoinSpec, join_tables},
    load::{KeySequence, LoadOptions, load_directory_to_table},
    schema::ColumnType,
    store::Store,
};
use rusqlite::types::Value as SqlValue;

fn query_strings(db: &Path, sql: &str) -> Vec<Vec<String>> {
    let store = Store::open(db).expect("open store");
    let conn = store.connection();
    let mut stmt = conn.prepare(sql).expect("prepare");
    let width = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|idx| {
                    let value: SqlValue = row.get(idx)?;
                    Ok(match value {
                        SqlValue::Null => String::new(),
                        SqlValue::Integer(i) => i.to_string(),
                        SqlValue::Real(f) => f.to_string(),
                        SqlValue::Text(t) => t,
                        SqlValue::Blob(_) => "<blob>".to_string(),
                    })
                })
                .collect::<rusqlite::Result<Vec<String>>>()
        })
        .expect("query")
        .collect::<rusqlite::Result<Vec<_>>>()
        .expect("rows");
    rows
}

fn column_names(db: &Path, table: &str) -> Vec<String> {
    Store::open(db)
        .expect("open store")
        .table_schema(table)
        .expect("schema")
        .names()
}

fn write_educandos(ws: &TestWorkspace) {
    ws.write(
        "educandos",
        "educandos_2020.tsv",
        "CODESC\tNOME\tDATABASE\n12345\tAna\tEDUCANDOS\n777\tBia\tEDUCANDOS\n",
    );
    ws.write(
        "educandos",
        "educandos_2021.tsv",
        "CODESC\tNOME\tDATABASE\n12345\tCaio\tEDUCANDOS\n",
    );
}

#[test]
fn load_derives_surrogate_key_from_file_name() {
    let ws = TestWorkspace::new();
    write_educandos(&ws);
    let db = ws.path().join("store.db");

    let summary = load_directory_to_table(
        &ws.path().join("educandos"),
        &db,
        "educandos",
        &LoadOptions::default(),
    )
    .expect("load");
    assert!(summary.created);
    assert_eq!(summary.files, 2);
    assert_eq!(summary.rows, 3);

    assert_eq!(
        column_names(&db, "educandos"),
        vec!["CODESC", "NOME", "DATABASE", "SK_CODESC_ANO"]
    );
    let keys = query_strings(&db, "SELECT SK_CODESC_ANO FROM educandos ORDER BY rowid");
    assert_eq!(keys, vec![vec!["123452020"], vec!["7772020"], vec!["123452021"]]);
}

#[test]
fn loading_twice_appends_duplicate_rows() {
    let ws = TestWorkspace::new();
    write_educandos(&ws);
    let db = ws.path().join("store.db");
    let source = ws.path().join("educandos");

    let first = load_directory_to_table(&source, &db, "educandos", &LoadOptions::default())
        .expect("first load");
    let second = load_directory_to_table(&source, &db, "educandos", &LoadOptions::default())
        .expect("second load");
    assert!(first.created);
    assert!(!second.created);

    let count = query_strings(&db, "SELECT COUNT(*) FROM educandos");
    assert_eq!(count, vec![vec!["6"]]);
    let distinct = query_strings(&db, "SELECT COUNT(DISTINCT SK_CODESC_ANO) FROM educandos");
    assert_eq!(distinct, vec![vec!["3"]]);
}

#[test]
fn generated_primary_key_restarts_per_file_by_default() {
    let ws = TestWorkspace::new();
    write_educandos(&ws);
    let db = ws.path().join("store.db");
    let options = LoadOptions {
        primary_key: Some("PK_EDUCANDOS".to_string()),
        ..LoadOptions::default()
    };
    load_directory_to_table(&ws.path().join("educandos"), &db, "educandos", &options)
        .expect("load");

    assert_eq!(column_names(&db, "educandos")[0], "PK_EDUCANDOS");
    let keys = query_strings(&db, "SELECT PK_EDUCANDOS FROM educandos ORDER BY rowid");
    assert_eq!(keys, vec![vec!["1"], vec!["2"], vec!["1"]]);
}

#[test]
fn global_primary_key_stays_unique_across_runs() {
    let ws = TestWorkspace::new();
    write_educandos(&ws);
    let db = ws.path().join("store.db");
    let source = ws.path().join("educandos");
    let options = LoadOptions {
        primary_key: Some("PK_EDUCANDOS".to_string()),
        key_sequence: KeySequence::Global,
        ..LoadOptions::default()
    };
    load_directory_to_table(&source, &db, "educandos", &options).expect("first load");
    load_directory_to_table(&source, &db, "educandos", &options).expect("second load");

    let keys = query_strings(&db, "SELECT PK_EDUCANDOS FROM educandos ORDER BY rowid");
    let flat: Vec<String> = keys.into_iter().flatten().collect();
    assert_eq!(flat, vec!["1", "2", "3", "4", "5", "6"]);
}

#[test]
fn column_types_are_fixed_at_creation() {
    let ws = TestWorkspace::new();
    ws.write("src", "notas_2019.tsv", "CODESC\tNOTA\tTURMA\n1\t7.5\t01\n");
    ws.write("src", "notas_2020.tsv", "CODESC\tNOTA\tTURMA\n2\t8\tA\n");
    let db = ws.path().join("store.db");
    let options = LoadOptions {
        column_types: vec![("TURMA".to_string(), ColumnType::Text)],
        ..LoadOptions::default()
    };
    load_directory_to_table(&ws.path().join("src"), &db, "notas", &options).expect("load");

    let schema = Store::open(&db)
        .expect("open")
        .table_schema("notas")
        .expect("schema");
    let types: Vec<ColumnType> = schema.columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Text,
            ColumnType::Text
        ]
    );
    let rows = query_strings(&db, "SELECT typeof(NOTA), TURMA FROM notas ORDER BY rowid");
    assert_eq!(rows, vec![vec!["real", "01"], vec!["real", "A"]]);
}

#[test]
fn missing_identifier_column_is_reported() {
    let ws = TestWorkspace::new();
    ws.write("src", "escolas_2020.tsv", "ID\tNOME\n1\tX\n");
    let db = ws.path().join("store.db");
    let err = load_directory_to_table(
        &ws.path().join("src"),
        &db,
        "escolas",
        &LoadOptions::default(),
    )
    .expect_err("no CODESC");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::MissingColumn { .. })
    ));
}

#[test]
fn unknown_columns_in_later_files_are_rejected() {
    let ws = TestWorkspace::new();
    ws.write("src", "escolas_2020.tsv", "CODESC\tNOME\n1\tX\n");
    ws.write("src", "escolas_2021.tsv", "CODESC\tNOME\tNOVA\n1\tX\ty\n");
    let db = ws.path().join("store.db");
    let err = load_directory_to_table(
        &ws.path().join("src"),
        &db,
        "escolas",
        &LoadOptions::default(),
    )
    .expect_err("new column");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::SchemaMismatch { .. })
    ));
}

fn load_pair(ws: &TestWorkspace, db: &Path) {
    ws.write(
        "escolas",
        "escolas_2020.tsv",
        "CODESC\tNOME\tCIDADE\tDATABASE\n12345\tEscola A\tSantos\tESCOLAS\n999\tEscola Z\tLins\tESCOLAS\n",
    );
    ws.write(
        "educandos",
        "educandos_2020.tsv",
        "CODESC\tNOME\tSERIE\tDATABASE\n12345\tAna\t5\tEDUCANDOS\n12345\tBia\t6\tEDUCANDOS\n",
    );
    let options = LoadOptions::default();
    load_directory_to_table(&ws.path().join("escolas"), db, "escolas", &options)
        .expect("load escolas");
    load_directory_to_table(&ws.path().join("educandos"), db, "educandos", &options)
        .expect("load educandos");
}

#[test]
fn join_keeps_left_values_and_aliases_origin_columns() {
    let ws = TestWorkspace::new();
    let db = ws.path().join("store.db");
    load_pair(&ws, &db);

    let summary = join_tables(&db, &JoinSpec::new("escolas", "educandos", "escolas_educandos"))
        .expect("join");
    assert_eq!(summary.rows, 2);
    assert_eq!(
        summary.columns,
        vec![
            "CODESC",
            "NOME",
            "CIDADE",
            "DATABASE_ESCOLAS",
            "SK_CODESC_ANO",
            "SERIE",
            "DATABASE_EDUCANDOS"
        ]
    );
    assert_eq!(column_names(&db, "escolas_educandos"), summary.columns);

    let rows = query_strings(
        &db,
        "SELECT NOME, SERIE, DATABASE_ESCOLAS, DATABASE_EDUCANDOS FROM escolas_educandos ORDER BY SERIE",
    );
    assert_eq!(
        rows,
        vec![
            vec!["Escola A", "5", "ESCOLAS", "EDUCANDOS"],
            vec!["Escola A", "6", "ESCOLAS", "EDUCANDOS"],
        ]
    );
}

#[test]
fn join_without_shared_keys_is_empty() {
    let ws = TestWorkspace::new();
    ws.write("a", "a_2019.tsv", "CODESC\tX\n1\tx\n");
    ws.write("b", "b_2020.tsv", "CODESC\tY\n1\ty\n");
    let db = ws.path().join("store.db");
    load_directory_to_table(&ws.path().join("a"), &db, "a", &LoadOptions::default()).expect("a");
    load_directory_to_table(&ws.path().join("b"), &db, "b", &LoadOptions::default()).expect("b");

    let summary = join_tables(&db, &JoinSpec::new("a", "b", "ab")).expect("join");
    assert_eq!(summary.rows, 0);
}

#[test]
fn join_refuses_to_overwrite_output() {
    let ws = TestWorkspace::new();
    let db = ws.path().join("store.db");
    load_pair(&ws, &db);
    let spec = JoinSpec::new("escolas", "educandos", "escolas_educandos");
    join_tables(&db, &spec).expect("first join");
    let err = join_tables(&db, &spec).expect_err("output exists");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::TableExists(name)) if name == "escolas_educandos"
    ));
}

#[test]
fn join_requires_key_in_both_tables() {
    let ws = TestWorkspace::new();
    let db = ws.path().join("store.db");
    load_pair(&ws, &db);
    let mut spec = JoinSpec::new("escolas", "educandos", "out");
    spec.join_key = "CIDADE".to_string();
    let err = join_tables(&db, &spec).expect_err("key missing on right");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::SchemaMismatch { table, .. }) if table == "educandos"
    ));
}

#[test]
fn loading_with_different_table_name_case_appends() {
    let ws = TestWorkspace::new();
    ws.write("src", "e_2020.tsv", "CODESC\tNOME\n1\tAna\n");
    let db = ws.path().join("store.db");
    let source = ws.path().join("src");

    let first = load_directory_to_table(&source, &db, "Educandos", &LoadOptions::default())
        .expect("first load");
    let second = load_directory_to_table(&source, &db, "educandos", &LoadOptions::default())
        .expect("second load");
    assert!(first.created);
    assert!(!second.created);

    let count = query_strings(&db, "SELECT COUNT(*) FROM Educandos");
    assert_eq!(count, vec![vec!["2"]]);
}

#[test]
fn join_output_name_is_compared_without_case() {
    let ws = TestWorkspace::new();
    let db = ws.path().join("store.db");
    load_pair(&ws, &db);
    join_tables(&db, &JoinSpec::new("escolas", "educandos", "Escolas_Educandos"))
        .expect("first join");

    let err = join_tables(&db, &JoinSpec::new("escolas", "educandos", "escolas_educandos"))
        .expect_err("output exists under another case");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::TableExists(_))
    ));
}

#[test]
fn short_rows_load_with_null_trailing_cells() {
    let ws = TestWorkspace::new();
    ws.write("src", "escolas_2020.tsv", "CODESC\tNOME\tCIDADE\n1\tX\n2\tY\tLins\n");
    let db = ws.path().join("store.db");
    let summary = load_directory_to_table(
        &ws.path().join("src"),
        &db,
        "escolas",
        &LoadOptions::default(),
    )
    .expect("load");
    assert_eq!(summary.rows, 2);

    let rows = query_strings(
        &db,
        "SELECT CODESC, CIDADE IS NULL, SK_CODESC_ANO FROM escolas ORDER BY rowid",
    );
    assert_eq!(
        rows,
        vec![vec!["1", "1", "12020"], vec!["2", "0", "22020"]]
    );
}

#[test]
fn rows_wider_than_the_header_fail_the_load() {
    let ws = TestWorkspace::new();
    ws.write("src", "escolas_2020.tsv", "CODESC\tNOME\n1\tX\textra\n");
    let db = ws.path().join("store.db");
    let err = load_directory_to_table(
        &ws.path().join("src"),
        &db,
        "escolas",
        &LoadOptions::default(),
    )
    .expect_err("extra field");
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::Parse { .. })
    ));
}

#[test]
fn existing_key_columns_match_without_case() {
    let ws = TestWorkspace::new();
    ws.write(
        "src",
        "escolas_2020.tsv",
        "pk\tcodesc\tNOME\n10\t5\tX\n11\t6\tY\n",
    );
    let db = ws.path().join("store.db");
    let options = LoadOptions {
        primary_key: Some("PK".to_string()),
        ..LoadOptions::default()
    };
    load_directory_to_table(&ws.path().join("src"), &db, "escolas", &options).expect("load");

    assert_eq!(
        column_names(&db, "escolas"),
        vec!["pk", "codesc", "NOME", "SK_CODESC_ANO"]
    );
    let rows = query_strings(&db, "SELECT PK, SK_CODESC_ANO FROM escolas ORDER BY rowid");
    assert_eq!(rows, vec![vec!["10", "52020"], vec!["11", "62020"]]);
}
