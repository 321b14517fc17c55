//! Lecteur CSV minimal (séparateur virgule, guillemets doubles)

use memchr::memchr_iter;
use serde_json::{Map, Number, Value};

use crate::error::{Result, TotsError};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Table CSV : en-têtes + lignes de valeurs brutes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Index d'une colonne, sans tenir compte de la casse
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Ligne convertie en attributs, en excluant les colonnes données
    pub fn attributes(&self, row: &[String], skip: &[usize]) -> Map<String, Value> {
        self.headers
            .iter()
            .zip(row)
            .enumerate()
            .filter(|(idx, _)| !skip.contains(idx))
            .map(|(_, (header, raw))| (header.clone(), typed_value(raw)))
            .collect()
    }
}

/// Parse un fichier CSV complet
pub fn parse(data: &[u8], file: &str) -> Result<CsvTable> {
    let data = data.strip_prefix(BOM).unwrap_or(data);
    let text = std::str::from_utf8(data)
        .map_err(|e| TotsError::parse_error(file, format!("invalid UTF-8: {}", e)))?;

    let mut lines = split_lines(text).into_iter().filter(|l| !l.trim().is_empty());

    let headers: Vec<String> = match lines.next() {
        Some(line) => split_fields(line)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect(),
        None => return Ok(CsvTable::default()),
    };

    let mut rows = Vec::new();
    for (idx, line) in lines.enumerate() {
        let fields = split_fields(line);
        if fields.len() != headers.len() {
            return Err(TotsError::parse_error(
                file,
                format!(
                    "row {} has {} fields, expected {}",
                    idx + 2,
                    fields.len(),
                    headers.len()
                ),
            ));
        }
        rows.push(fields);
    }

    Ok(CsvTable { headers, rows })
}

/// Découpe en lignes (CRLF ou LF), sans couper dans un champ entre guillemets
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;

    for pos in memchr_iter(b'\n', bytes) {
        let quotes = memchr_iter(b'"', &bytes[start..pos]).count();
        if quotes % 2 == 1 {
            continue;
        }
        lines.push(text[start..pos].trim_end_matches('\r'));
        start = pos + 1;
    }
    if start < bytes.len() {
        lines.push(text[start..].trim_end_matches('\r'));
    }
    lines
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Valeur typée : vide → null, nombre si possible, sinon chaîne
fn typed_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(raw.to_string())
}
