use std::path::{Path, PathBuf};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const HEADER: &str = "produto,quantidade,valor";

/// Write a sales CSV with the standard header and `rows` as
/// `(produto, quantidade, valor)`.
pub fn write_sales_csv(path: &Path, rows: &[(&str, i64, f64)]) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut body = String::from(HEADER);
    body.push('\n');
    for (produto, quantidade, valor) in rows {
        body.push_str(&format!("{produto},{quantidade},{valor:?}\n"));
    }
    std::fs::write(path, body)?;
    Ok(())
}

/// Source directory under `tmp` seeded with two CSVs and one non-CSV file.
pub fn seeded_source_dir(tmp: &tempfile::TempDir) -> TestResult<PathBuf> {
    let dir = tmp.path().join("pasta_gdown");
    write_sales_csv(&dir.join("b_fevereiro.csv"), &[("caderno", 2, 4.0)])?;
    write_sales_csv(
        &dir.join("a_janeiro.csv"),
        &[("caneta", 3, 10.5), ("lapis", 10, 1.25)],
    )?;
    std::fs::write(dir.join("leia-me.txt"), "not a csv")?;
    Ok(dir)
}
