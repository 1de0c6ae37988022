use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use tracing::{debug, warn};

use cashflow_valuation_core::pipeline::ValuationSource;
use cashflow_valuation_core::{Quarter, RateObservation, RawRate, ValuationError, ValuationResult};

use super::file::resolve_path;

const ENTITY_COLUMNS: &[&str] = &["entity_id", "gvkey"];
const DATE_COLUMNS: &[&str] = &["date", "datadate"];
const PERIOD_COLUMNS: &[&str] = &["period", "quarter"];
const AMOUNT_COLUMNS: &[&str] = &["amount", "oancfy"];
const RATE_DATE_COLUMNS: &[&str] = &["observation_date", "date"];
const RATE_VALUE_COLUMNS: &[&str] = &["rate", "dtb3", "value"];

/// Batch input read from a cash-flow CSV and an optional rate CSV.
///
/// Rows with a missing amount or rate (empty or `.`) are skipped. A row that
/// cannot be parsed fails only the entity it belongs to.
#[derive(Debug, Default)]
pub struct CsvSource {
    cash_flows: BTreeMap<String, Vec<(Quarter, f64)>>,
    row_errors: HashMap<String, String>,
    rates: Vec<RateObservation>,
}

fn is_missing(field: &str) -> bool {
    let f = field.trim();
    f.is_empty() || f == "." || f.eq_ignore_ascii_case("nan") || f.eq_ignore_ascii_case("na")
}

fn parse_date(field: &str) -> Option<NaiveDate> {
    let f = field.trim();
    ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(f, fmt).ok())
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn require_column(headers: &csv::StringRecord, names: &[&str], file: &str) -> ValuationResult<usize> {
    find_column(headers, names).ok_or_else(|| {
        ValuationError::DataRetrieval(format!("{file}: missing column, expected one of {names:?}"))
    })
}

fn csv_error(file: &str, e: csv::Error) -> ValuationError {
    ValuationError::DataRetrieval(format!("{file}: {e}"))
}

impl CsvSource {
    pub fn from_paths(cash_flows: &str, rates: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let cf_file = File::open(resolve_path(cash_flows)?)?;
        let source = match rates {
            Some(path) => Self::from_readers(cf_file, Some(File::open(resolve_path(path)?)?))?,
            None => Self::from_readers(cf_file, None::<File>)?,
        };
        Ok(source)
    }

    pub fn from_readers<C: Read, R: Read>(cash_flows: C, rates: Option<R>) -> ValuationResult<Self> {
        let mut source = Self::default();
        source.load_cash_flows(cash_flows)?;
        if let Some(r) = rates {
            source.load_rates(r)?;
        }
        debug!(
            entities = source.cash_flows.len(),
            rate_observations = source.rates.len(),
            "csv input loaded"
        );
        Ok(source)
    }

    fn load_cash_flows<C: Read>(&mut self, reader: C) -> ValuationResult<()> {
        const FILE: &str = "cash flows";
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers().map_err(|e| csv_error(FILE, e))?.clone();
        let entity_col = require_column(&headers, ENTITY_COLUMNS, FILE)?;
        let amount_col = require_column(&headers, AMOUNT_COLUMNS, FILE)?;
        let period_col = find_column(&headers, PERIOD_COLUMNS);
        let date_col = find_column(&headers, DATE_COLUMNS);
        if period_col.is_none() && date_col.is_none() {
            return Err(ValuationError::DataRetrieval(format!(
                "{FILE}: missing column, expected one of {:?}",
                [DATE_COLUMNS, PERIOD_COLUMNS].concat()
            )));
        }

        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| csv_error(FILE, e))?;
            let entity_id = record.get(entity_col).unwrap_or_default().to_string();
            if entity_id.is_empty() {
                warn!(line = line + 2, "cash flow row without entity id skipped");
                continue;
            }
            let flows = self.cash_flows.entry(entity_id.clone()).or_default();

            let amount = record.get(amount_col).unwrap_or_default();
            if is_missing(amount) {
                continue;
            }
            let parsed = parse_row(&record, amount, period_col, date_col);
            match parsed {
                Ok(pair) => flows.push(pair),
                Err(reason) => {
                    self.row_errors
                        .entry(entity_id)
                        .or_insert(format!("line {}: {reason}", line + 2));
                }
            }
        }
        Ok(())
    }

    fn load_rates<R: Read>(&mut self, reader: R) -> ValuationResult<()> {
        const FILE: &str = "rates";
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = rdr.headers().map_err(|e| csv_error(FILE, e))?.clone();
        let date_col = require_column(&headers, RATE_DATE_COLUMNS, FILE)?;
        let value_col = require_column(&headers, RATE_VALUE_COLUMNS, FILE)?;

        for (line, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| csv_error(FILE, e))?;
            let value = record.get(value_col).unwrap_or_default();
            if is_missing(value) {
                continue;
            }
            let raw_date = record.get(date_col).unwrap_or_default();
            let date = parse_date(raw_date).ok_or_else(|| {
                ValuationError::DataRetrieval(format!("{FILE}: line {}: bad date '{raw_date}'", line + 2))
            })?;
            // normalised later, per curve, so a bad quote surfaces as MalformedRate
            self.rates.push(RateObservation {
                date,
                value: RawRate::Text(value.to_string()),
            });
        }
        Ok(())
    }
}

fn parse_row(
    record: &csv::StringRecord,
    amount: &str,
    period_col: Option<usize>,
    date_col: Option<usize>,
) -> Result<(Quarter, f64), String> {
    let amount: f64 = amount
        .parse()
        .map_err(|_| format!("amount '{amount}' is not a number"))?;
    let period = match (period_col, date_col) {
        (Some(c), _) if !record.get(c).unwrap_or_default().is_empty() => record
            .get(c)
            .unwrap_or_default()
            .parse::<Quarter>()
            .map_err(|e| e.to_string())?,
        (_, Some(c)) => {
            let raw = record.get(c).unwrap_or_default();
            Quarter::from_date(parse_date(raw).ok_or_else(|| format!("bad date '{raw}'"))?)
        }
        _ => return Err("row has neither period nor date".into()),
    };
    Ok((period, amount))
}

impl ValuationSource for CsvSource {
    fn entity_ids(&self) -> ValuationResult<Vec<String>> {
        Ok(self.cash_flows.keys().cloned().collect())
    }

    fn cash_flows(&self, entity_id: &str) -> ValuationResult<Vec<(Quarter, f64)>> {
        if let Some(reason) = self.row_errors.get(entity_id) {
            return Err(ValuationError::DataRetrieval(format!(
                "cash flows of '{entity_id}': {reason}"
            )));
        }
        self.cash_flows
            .get(entity_id)
            .cloned()
            .ok_or_else(|| ValuationError::DataRetrieval(format!("unknown entity '{entity_id}'")))
    }

    fn rate_observations(&self, _entity_id: &str) -> ValuationResult<Vec<RateObservation>> {
        Ok(self.rates.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASH_FLOWS: &str = "\
gvkey,datadate,oancfy
001004,2015-03-31,120.5
001004,2015-06-30,80
001004,2015-09-30,.
001045,2015-03-31,abc
001045,2015-06-30,10
001078,20150331,55
";

    const RATES: &str = "\
observation_date,DTB3
2015-01-02,\"0,02\"
2015-01-05,.
2015-04-01,\"0,03\"
";

    fn source() -> CsvSource {
        CsvSource::from_readers(CASH_FLOWS.as_bytes(), Some(RATES.as_bytes())).unwrap()
    }

    #[test]
    fn test_wrds_column_names_accepted() {
        let s = source();
        assert_eq!(s.entity_ids().unwrap(), vec!["001004", "001045", "001078"]);
        let flows = s.cash_flows("001004").unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0], ("2015Q1".parse().unwrap(), 120.5));
        assert_eq!(s.cash_flows("001078").unwrap()[0].0.to_string(), "2015Q1");
    }

    #[test]
    fn test_bad_row_fails_only_its_entity() {
        let s = source();
        let err = s.cash_flows("001045").unwrap_err();
        assert!(err.to_string().contains("line 5"), "{err}");
        assert!(s.cash_flows("001004").is_ok());
    }

    #[test]
    fn test_missing_rates_skipped_and_kept_raw() {
        let s = source();
        let rates = s.rate_observations("001004").unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].value, RawRate::Text("0,02".into()));
    }

    #[test]
    fn test_period_column_and_missing_columns() {
        let s = CsvSource::from_readers("entity_id,period,amount\nA,2020Q2,5\n".as_bytes(), None::<&[u8]>)
            .unwrap();
        assert_eq!(s.cash_flows("A").unwrap()[0].0.to_string(), "2020Q2");
        assert!(s.rate_observations("A").unwrap().is_empty());

        let missing = CsvSource::from_readers("entity_id,amount\nA,5\n".as_bytes(), None::<&[u8]>);
        assert!(matches!(missing, Err(ValuationError::DataRetrieval(_))));
    }
}
