//! Bronze to processed: joins raw race and qualifying results into the
//! one-row-per-driver-per-race CSV the trainer reads.
//!
//! The bronze files hold the results API's nested objects as Python dict
//! literals (`{'driverId': 'max_verstappen', 'code': 'VER', ...}`). Driver
//! dicts are unpacked into flat columns, constructor dicts collapse to their
//! id, and qualifying lap times become seconds.

use std::{collections::BTreeMap, io::Read, path::Path};

use crate::{
    artifacts,
    dataset::{csv_error, parse_lap_time},
    error::{ArtifactError, DatasetError},
    types::fields,
};

pub const DEFAULT_RACE_BRONZE: &str = "data/csv/race_bronze_df.csv";
pub const DEFAULT_QUALIFYING_BRONZE: &str = "data/csv/qualifying_bronze_df.csv";
pub const DEFAULT_PROCESSED: &str = "data/csv/f1_processed_data.csv";

const DRIVER: &str = "Driver";
const DRIVER_ID: &str = "driverId";
const DRIVER_COLUMNS: [&str; 4] = [DRIVER_ID, "driverCode", "driverName", "driverNumber"];
const Q_COLUMNS: [(&str, &str); 3] = [
    ("Q1", fields::Q1),
    ("Q2", fields::Q2),
    ("Q3", fields::Q3),
];
/// Columns a race row and a qualifying row must agree on to be joined.
const JOIN_KEYS: [&str; 5] = [
    fields::YEAR,
    fields::ROUND,
    fields::RACE_NAME,
    DRIVER_ID,
    fields::CONSTRUCTOR,
];

/// A CSV held as text cells. Empty cells are missing values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|source| ArtifactError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_reader(reader)
    }

    pub fn from_csv_str(content: &str) -> Result<Self, DatasetError> {
        Self::from_reader(
            csv::ReaderBuilder::new()
                .has_headers(true)
                .from_reader(content.as_bytes()),
        )
    }

    fn from_reader<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, DatasetError> {
        let header: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(str::to_string)
            .collect();
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(DatasetError::MissingHeader);
        }
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<_>>()))
            .collect::<Result<_, csv::Error>>()
            .map_err(csv_error)?;
        Ok(Self { header, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    fn require(&self, name: &str) -> Result<usize, DatasetError> {
        self.column(name)
            .ok_or_else(|| DatasetError::MissingColumn(name.to_string()))
    }

    /// Cell by column name; `None` when the column is absent or the cell empty.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column(name)?;
        self.rows
            .get(row)?
            .get(col)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Overwrite `name` in every row, appending the column if it is new.
    fn set_column(&mut self, name: &str, values: Vec<Option<String>>) {
        let col = match self.column(name) {
            Some(col) => col,
            None => {
                self.header.push(name.to_string());
                for row in &mut self.rows {
                    row.push(String::new());
                }
                self.header.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[col] = value.unwrap_or_default();
        }
    }

    fn drop_column(&mut self, name: &str) {
        if let Some(col) = self.column(name) {
            self.header.remove(col);
            for row in &mut self.rows {
                row.remove(col);
            }
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let mut bytes = Vec::new();
        {
            let mut writer = csv::Writer::from_writer(&mut bytes);
            writer.write_record(&self.header)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush().map_err(csv::Error::from)?;
        }
        artifacts::write_atomic(path, &bytes)?;
        Ok(())
    }
}

/// Flat fields of the driver object carried by race and qualifying rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverInfo {
    pub driver_id: Option<String>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub number: Option<String>,
}

impl DriverInfo {
    /// Unparseable input yields an all-empty record.
    pub fn parse(raw: &str) -> Self {
        let Some(dict) = parse_literal_dict(raw) else {
            return Self::default();
        };
        let name = match (dict.get("givenName"), dict.get("familyName")) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (given, family) => given.or(family).cloned(),
        };
        Self {
            driver_id: dict.get("driverId").cloned(),
            code: dict.get("code").cloned(),
            name,
            number: dict.get("permanentNumber").cloned(),
        }
    }

    fn into_columns(self) -> [Option<String>; 4] {
        [self.driver_id, self.code, self.name, self.number]
    }
}

pub fn constructor_id(raw: &str) -> Option<String> {
    parse_literal_dict(raw)?.remove("constructorId")
}

/// Replace the `Driver` dict column with flat driver columns and the
/// `Constructor` dict with its id.
fn unpack_objects(table: &mut Table) -> Result<(), DatasetError> {
    let driver = table.require(DRIVER)?;
    let constructor = table.require(fields::CONSTRUCTOR)?;

    let mut driver_columns: [Vec<Option<String>>; 4] = Default::default();
    for row in &table.rows {
        for (col, value) in driver_columns
            .iter_mut()
            .zip(DriverInfo::parse(&row[driver]).into_columns())
        {
            col.push(value);
        }
    }
    let constructors = table
        .rows
        .iter()
        .map(|row| constructor_id(&row[constructor]))
        .collect();

    table.drop_column(DRIVER);
    for (name, values) in DRIVER_COLUMNS.iter().zip(driver_columns) {
        table.set_column(name, values);
    }
    table.set_column(fields::CONSTRUCTOR, constructors);
    Ok(())
}

fn numeric(table: &Table, name: &str) -> Result<Vec<Option<f64>>, DatasetError> {
    table.require(name)?;
    Ok((0..table.len())
        .map(|r| table.get(r, name).and_then(|v| v.trim().parse().ok()))
        .collect())
}

fn format_number(values: &[Option<f64>]) -> Vec<Option<String>> {
    values.iter().map(|v| v.map(|x| x.to_string())).collect()
}

/// Driver and constructor unpacking plus `Position`, `GridPosition`,
/// `Points` and `PositionsGained = GridPosition - Position`.
pub fn clean_race(mut race: Table) -> Result<Table, DatasetError> {
    unpack_objects(&mut race)?;
    let position = numeric(&race, "position")?;
    let grid = numeric(&race, "grid")?;
    let points = numeric(&race, "points")?;
    let gained: Vec<Option<f64>> = grid
        .iter()
        .zip(&position)
        .map(|(g, p)| Some((*g)? - (*p)?))
        .collect();

    race.set_column(fields::POSITION, format_number(&position));
    race.set_column(fields::GRID_POSITION, format_number(&grid));
    race.set_column(fields::POINTS, format_number(&points));
    race.set_column(fields::POSITIONS_GAINED, format_number(&gained));
    Ok(race)
}

/// Driver and constructor unpacking, Q-times in seconds and
/// `BestQualiTime` as the fastest session that has a time.
pub fn clean_qualifying(mut quali: Table) -> Result<Table, DatasetError> {
    unpack_objects(&mut quali)?;
    let mut seconds: Vec<Vec<Option<f64>>> = Vec::with_capacity(Q_COLUMNS.len());
    for (raw, parsed) in Q_COLUMNS {
        let values: Vec<Option<f64>> = (0..quali.len())
            .map(|r| quali.get(r, raw).and_then(parse_lap_time))
            .collect();
        quali.set_column(parsed, format_number(&values));
        seconds.push(values);
    }
    let best: Vec<Option<f64>> = (0..quali.len())
        .map(|r| {
            seconds
                .iter()
                .filter_map(|col| col[r])
                .min_by(f64::total_cmp)
        })
        .collect();
    quali.set_column(fields::BEST_QUALI_TIME, format_number(&best));
    Ok(quali)
}

/// Left join of qualifying times onto race rows. Race rows without a
/// qualifying match keep empty time cells; a key cell that is empty never
/// matches.
pub fn merge(mut race: Table, quali: &Table) -> Result<Table, DatasetError> {
    for key in JOIN_KEYS {
        race.require(key)?;
        quali.require(key)?;
    }
    let key_of = |table: &Table, row: usize| -> Option<Vec<String>> {
        JOIN_KEYS
            .iter()
            .map(|k| table.get(row, k).map(|v| v.trim().to_string()))
            .collect()
    };

    let mut index: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for row in 0..quali.len() {
        if let Some(key) = key_of(quali, row) {
            index.entry(key).or_insert(row);
        }
    }

    let carried = [fields::Q1, fields::Q2, fields::Q3, fields::BEST_QUALI_TIME];
    let matches: Vec<Option<usize>> = (0..race.len())
        .map(|row| key_of(&race, row).and_then(|k| index.get(&k).copied()))
        .collect();
    tracing::info!(
        "{} of {} race rows matched a qualifying result",
        matches.iter().flatten().count(),
        race.len()
    );
    for name in carried {
        let values = matches
            .iter()
            .map(|m| m.and_then(|q| quali.get(q, name)).map(str::to_string))
            .collect();
        race.set_column(name, values);
    }
    Ok(race)
}

/// Read both bronze files, clean them, join them and write the result.
pub fn process_bronze(race_csv: &Path, quali_csv: &Path, out_csv: &Path) -> Result<Table, DatasetError> {
    let race = Table::from_path(race_csv)?;
    let quali = Table::from_path(quali_csv)?;
    tracing::info!(
        "loaded {} race results and {} qualifying results",
        race.len(),
        quali.len()
    );

    let race = clean_race(race)?;
    let quali = clean_qualifying(quali)?;
    let merged = merge(race, &quali)?;
    if merged.is_empty() {
        return Err(DatasetError::Empty);
    }
    merged.write(out_csv)?;
    tracing::info!("saved {} processed rows to {}", merged.len(), out_csv.display());
    Ok(merged)
}

/// Parse a flat Python dict literal of scalar values. String values are
/// unquoted; `None` values are left out; nested containers are kept as
/// their source text.
pub fn parse_literal_dict(raw: &str) -> Option<BTreeMap<String, String>> {
    let mut p = LiteralParser {
        src: raw.trim(),
        pos: 0,
    };
    let dict = p.dict()?;
    p.skip_ws();
    (p.pos == p.src.len()).then_some(dict)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl LiteralParser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Option<()> {
        self.skip_ws();
        (self.bump()? == want).then_some(())
    }

    fn dict(&mut self) -> Option<BTreeMap<String, String>> {
        self.expect('{')?;
        let mut out = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek()? == '}' {
                self.bump();
                return Some(out);
            }
            let key = self.string()?;
            self.expect(':')?;
            self.skip_ws();
            if let Some(value) = self.value()? {
                out.insert(key, value);
            }
            self.skip_ws();
            match self.bump()? {
                ',' => continue,
                '}' => return Some(out),
                _ => return None,
            }
        }
    }

    /// `None` for a Python `None`.
    fn value(&mut self) -> Option<Option<String>> {
        match self.peek()? {
            '\'' | '"' => self.string().map(Some),
            '{' | '[' | '(' => self.container().map(Some),
            _ => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ',' && c != '}') {
                    self.bump();
                }
                let token = self.src[start..self.pos].trim();
                match token {
                    "" => None,
                    "None" => Some(None),
                    _ => Some(Some(token.to_string())),
                }
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        self.skip_ws();
        let quote = self.bump().filter(|c| *c == '\'' || *c == '"')?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                },
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    /// Raw text of a bracketed value, honouring quotes inside it.
    fn container(&mut self) -> Option<String> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                '\'' | '"' => {
                    self.string()?;
                    continue;
                }
                '{' | '[' | '(' => depth += 1,
                '}' | ']' | ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump();
                        return Some(self.src[start..self.pos].to_string());
                    }
                }
                _ => {}
            }
            self.bump();
        }
    }
}
