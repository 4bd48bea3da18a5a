use std::sync::Arc;

use chrono::{Days, NaiveDate, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hotel_settle::config::BookingSettings;
use hotel_settle::engine::availability::available_rooms;
use hotel_settle::engine::pricing::{PricingRates, compute_breakdown};
use hotel_settle::model::{Guest, PaymentMethod, PriceBreakdown};
use hotel_settle::{
    Amount, BookingStatus, Command, Engine, FixedClock, NewReservation, Rate, Reservation,
    RoomCategory, StayRange, Store,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2031, 1, 1).unwrap()
}

fn category(total_rooms: u32) -> RoomCategory {
    RoomCategory {
        id: 1,
        hotel_id: 1,
        label: "Double".to_string(),
        nightly_rate: Amount::from_units(100),
        total_rooms,
        max_occupancy: 2,
    }
}

fn guest(id: u64) -> Guest {
    Guest {
        id,
        name: format!("guest {id}"),
        email: format!("guest{id}@example.com"),
        phone: None,
    }
}

/// Generates reservation requests spread over a year.
///
/// Pattern per request `i`:
/// 1. Check in `i % 360` days after the start
/// 2. Stay `1 + i % 7` nights
/// 3. Book one room
pub struct RequestGenerator {
    next: u64,
    count: u64,
}

impl RequestGenerator {
    pub fn new(count: u64) -> Self {
        Self { next: 0, count }
    }
}

impl Iterator for RequestGenerator {
    type Item = NewReservation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let i = self.next;
        self.next += 1;

        let check_in = start() + Days::new(i % 360);
        Some(NewReservation {
            category: 1,
            range: StayRange::new(check_in, check_in + Days::new(1 + i % 7)),
            room_count: 1,
            guests: 1,
            payment_method: PaymentMethod::Online,
            guest: guest(i),
        })
    }
}

/// Materialised reservations for pure availability scans.
fn reservations(count: u64) -> Vec<Reservation> {
    let at = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
    RequestGenerator::new(count)
        .enumerate()
        .map(|(idx, req)| Reservation {
            id: idx as u64 + 1,
            reference: format!("BK-{idx:08}"),
            category: req.category,
            guest: req.guest,
            range: req.range,
            room_count: req.room_count,
            guests: req.guests,
            status: BookingStatus::Pending,
            payment_method: req.payment_method,
            price: PriceBreakdown::default(),
            invoice_number: None,
            hold_expires_at: None,
            created_at: at,
            updated_at: at,
        })
        .collect()
}

fn bench_availability(c: &mut Criterion) {
    let mut group = c.benchmark_group("availability");
    let cat = category(u32::MAX);
    let range = StayRange::new(start() + Days::new(100), start() + Days::new(104));

    for count in [1_000u64, 10_000, 100_000] {
        let rows = reservations(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &rows, |b, rows| {
            b.iter(|| black_box(available_rooms(&cat, rows, &range, None)));
        });
    }

    group.finish();
}

fn bench_pricing(c: &mut Criterion) {
    let rates = PricingRates {
        tax: Rate::from_scaled(1_600),
        service: Rate::from_scaled(500),
    };
    c.bench_function("pricing", |b| {
        b.iter(|| {
            compute_breakdown(
                black_box(Amount::from_cents(12_345)),
                black_box(7),
                black_box(3),
                rates,
            )
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for count in [1_000u64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                runtime.block_on(async {
                    let clock = FixedClock(Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
                    let engine = Engine::new(
                        Arc::new(Store::new()),
                        BookingSettings::default(),
                        Arc::new(clock),
                    );
                    let commands = std::iter::once(Command::Category(category(1_000)))
                        .chain(RequestGenerator::new(count).map(Command::Reserve));
                    engine.run(tokio_stream::iter(commands)).await;
                    engine
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_availability, bench_pricing, bench_replay);
criterion_main!(benches);
