use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::Amount;
use crate::model::{
    Actor, BookingStatus, CategoryId, Command, Guest, NewReservation, PaymentMethod, Reservation,
    ReservationId, RoomCategory, StayRange,
};

/// Errors that can occur when reading commands or writing reservations
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized command type '{kind}'")]
    UnrecognizedType { line: usize, kind: String },

    #[error("line {line}: {kind} missing {field}")]
    MissingField {
        line: usize,
        kind: String,
        field: &'static str,
    },

    #[error("line {line}: invalid {field}: {reason}")]
    InvalidField {
        line: usize,
        field: &'static str,
        reason: String,
    },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    actor: Option<String>,
    reservation: Option<ReservationId>,
    category: Option<CategoryId>,
    hotel: Option<u32>,
    label: Option<String>,
    rate: Option<String>,
    rooms: Option<u32>,
    guests: Option<u32>,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    method: Option<String>,
    status: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    id: ReservationId,
    reference: &'a str,
    category: CategoryId,
    guest: u64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    rooms: u32,
    status: String,
    base: String,
    tax: String,
    service: String,
    total: String,
    invoice: &'a str,
}

/// Per-row accessors that turn absent or malformed cells into line-numbered
/// errors.
struct Row {
    line: usize,
    inner: InputRow,
}

impl Row {
    fn missing(&self, field: &'static str) -> CsvError {
        CsvError::MissingField {
            line: self.line,
            kind: self.inner.r#type.clone(),
            field,
        }
    }

    fn required<T>(&self, value: Option<T>, field: &'static str) -> Result<T, CsvError> {
        value.ok_or_else(|| self.missing(field))
    }

    fn parsed<T>(&self, value: Option<&str>, field: &'static str) -> Result<T, CsvError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required(value, field)?;
        raw.parse().map_err(|e: T::Err| CsvError::InvalidField {
            line: self.line,
            field,
            reason: e.to_string(),
        })
    }

    fn actor(&self) -> Result<Actor, CsvError> {
        self.parsed(self.inner.actor.as_deref(), "actor")
    }

    fn range(&self) -> Result<StayRange, CsvError> {
        Ok(StayRange::new(
            self.required(self.inner.check_in, "check_in")?,
            self.required(self.inner.check_out, "check_out")?,
        ))
    }

    fn into_command(self) -> Result<Command, CsvError> {
        match self.inner.r#type.as_str() {
            "category" => Ok(Command::Category(RoomCategory {
                id: self.required(self.inner.category, "category")?,
                hotel_id: self.inner.hotel.unwrap_or(1),
                label: self.inner.label.clone().unwrap_or_default(),
                nightly_rate: self.parsed::<Amount>(self.inner.rate.as_deref(), "rate")?,
                total_rooms: self.required(self.inner.rooms, "rooms")?,
                max_occupancy: self.required(self.inner.guests, "guests")?,
            })),
            "reserve" => {
                let actor = self.actor()?;
                let room_count = self.required(self.inner.rooms, "rooms")?;
                Ok(Command::Reserve(NewReservation {
                    category: self.required(self.inner.category, "category")?,
                    range: self.range()?,
                    room_count,
                    guests: self.inner.guests.unwrap_or(room_count),
                    payment_method: self
                        .parsed::<PaymentMethod>(self.inner.method.as_deref(), "method")?,
                    guest: Guest {
                        id: actor.id,
                        name: self.inner.name.clone().unwrap_or_default(),
                        email: self.inner.email.clone().unwrap_or_default(),
                        phone: None,
                    },
                }))
            }
            "cancel" => Ok(Command::Cancel {
                reservation: self.required(self.inner.reservation, "reservation")?,
                actor: self.actor()?,
            }),
            "status" => Ok(Command::UpdateStatus {
                reservation: self.required(self.inner.reservation, "reservation")?,
                status: self.parsed::<BookingStatus>(self.inner.status.as_deref(), "status")?,
                actor: self.actor()?,
            }),
            other => Err(CsvError::UnrecognizedType {
                line: self.line,
                kind: other.to_string(),
            }),
        }
    }
}

/// Read commands from a csv file.
///
/// Columns: `type,actor,reservation,category,hotel,label,rate,rooms,guests,
/// check_in,check_out,method,status,name,email`; unused cells may be empty.
pub fn read_commands(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Command, CsvError>>, CsvError> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })?;

    Ok(reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let inner = result.map_err(|source| CsvError::Parse { line, source })?;
            Row { line, inner }.into_command()
        }))
}

/// Write reservations to `out` in csv format
pub fn write_reservations<'a>(
    out: impl io::Write,
    reservations: impl IntoIterator<Item = &'a Reservation>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);

    for r in reservations {
        writer.serialize(OutputRow {
            id: r.id,
            reference: &r.reference,
            category: r.category,
            guest: r.guest.id,
            check_in: r.range.check_in,
            check_out: r.range.check_out,
            rooms: r.room_count,
            status: r.status.to_string(),
            base: r.price.base.to_string(),
            tax: r.price.tax.to_string(),
            service: r.price.service_charge.to_string(),
            total: r.price.total.to_string(),
            invoice: r.invoice_number.as_deref().unwrap_or(""),
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriceBreakdown;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "type,actor,reservation,category,hotel,label,rate,rooms,guests,check_in,check_out,method,status,name,email\n";

    fn write_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        file
    }

    fn read(rows: &str) -> Vec<Result<Command, CsvError>> {
        let file = write_csv(rows);
        read_commands(file.path()).unwrap().collect()
    }

    #[test]
    fn read_category() {
        let results = read("category,,,1,2,Double,100.00,10,2,,,,,,\n");
        match results.into_iter().next().unwrap().unwrap() {
            Command::Category(c) => {
                assert_eq!(c.id, 1);
                assert_eq!(c.hotel_id, 2);
                assert_eq!(c.nightly_rate, Amount::from_units(100));
                assert_eq!(c.total_rooms, 10);
                assert_eq!(c.max_occupancy, 2);
            }
            other => panic!("expected category, got {other:?}"),
        }
    }

    #[test]
    fn read_reserve() {
        let results =
            read("reserve,guest:7,,1,,,,2,3,2031-03-04,2031-03-07,online,,Ada,ada@example.com\n");
        match results.into_iter().next().unwrap().unwrap() {
            Command::Reserve(r) => {
                assert_eq!(r.guest.id, 7);
                assert_eq!(r.guest.email, "ada@example.com");
                assert_eq!(r.room_count, 2);
                assert_eq!(r.guests, 3);
                assert_eq!(r.range.nights(), 3);
                assert_eq!(r.payment_method, PaymentMethod::Online);
            }
            other => panic!("expected reserve, got {other:?}"),
        }
    }

    #[test]
    fn read_cancel_and_status_with_whitespace() {
        let results = read(
            "cancel, guest:7, 3,,,,,,,,,,,,\nstatus, admin:1, 4,,,,,,,,,,paid,,\n",
        );
        assert!(matches!(
            results[0],
            Ok(Command::Cancel { reservation: 3, .. })
        ));
        assert!(matches!(
            results[1],
            Ok(Command::UpdateStatus {
                reservation: 4,
                status: BookingStatus::Paid,
                ..
            })
        ));
    }

    #[test]
    fn read_returns_error_for_unknown_type() {
        let results = read("refund,guest:1,1,,,,,,,,,,,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedType { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_field() {
        let results = read("reserve,guest:1,,1,,,,2,,,2031-03-07,online,,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "check_in",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_bad_values() {
        let results = read(
            "category,,,1,,Suite,12.345,4,2,,,,,,\ncancel,someone,1,,,,,,,,,,,,\n",
        );
        assert!(matches!(
            results[0],
            Err(CsvError::InvalidField { field: "rate", .. })
        ));
        assert!(matches!(
            results[1],
            Err(CsvError::InvalidField {
                line: 3,
                field: "actor",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            read_commands("/nonexistent/commands.csv"),
            Err(CsvError::Open { .. })
        ));
    }

    #[test]
    fn write_reservation_rows() {
        let at = Utc.with_ymd_and_hms(2031, 3, 1, 10, 0, 0).unwrap();
        let reservation = Reservation {
            id: 1,
            reference: "BK-ABCD2345".to_string(),
            category: 1,
            guest: Guest {
                id: 7,
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            range: StayRange::new(
                NaiveDate::from_ymd_opt(2031, 3, 4).unwrap(),
                NaiveDate::from_ymd_opt(2031, 3, 7).unwrap(),
            ),
            room_count: 2,
            guests: 2,
            status: BookingStatus::Paid,
            payment_method: PaymentMethod::Online,
            price: PriceBreakdown {
                base: Amount::from_units(600),
                tax: Amount::from_units(96),
                service_charge: Amount::from_units(30),
                total: Amount::from_units(726),
            },
            invoice_number: Some("INV-20310301-001".to_string()),
            hold_expires_at: None,
            created_at: at,
            updated_at: at,
        };

        let mut out = Vec::new();
        write_reservations(&mut out, [&reservation]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,reference,category,guest,check_in,check_out,rooms,status,base,tax,service,total,invoice"
        );
        assert_eq!(
            lines[1],
            "1,BK-ABCD2345,1,7,2031-03-04,2031-03-07,2,PAID,600.00,96.00,30.00,726.00,INV-20310301-001"
        );
    }
}
