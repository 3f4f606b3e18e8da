use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::model::{Booking, BookingId, DateRange, Event};
use crate::wal::Wal;

#[derive(Debug)]
pub enum StoreError {
    NotFound(BookingId),
    Wal(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "booking not found: {id}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable store of booking records.
///
/// `query_by_date_range` is the conflict query: it returns the bookings that
/// lie entirely inside the window (`DateRange::encloses`), matching the
/// storage contract the availability check was written against.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<Booking>, StoreError>;

    /// Persist a new booking. Assigns the id and both timestamps.
    async fn add(&self, range: DateRange) -> Result<Booking, StoreError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Replace the date range of an existing booking. Keeps `created_at`,
    /// recomputes `modified_at`.
    async fn update(&self, id: BookingId, range: DateRange) -> Result<Booking, StoreError>;

    /// Remove a booking. Returns the number of rows affected (0 or 1).
    async fn delete(&self, id: BookingId) -> Result<u64, StoreError>;
}

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// In-memory booking table made durable by the WAL. Mutations append to the
/// log (through the group-commit writer) before touching the table; startup
/// replays the log back into the table.
pub struct WalStore {
    bookings: DashMap<BookingId, Booking>,
    next_id: AtomicI64,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let bookings = DashMap::new();
        let mut next_id: BookingId = 1;
        for event in events {
            match event {
                Event::BookingAdded { booking } | Event::BookingUpdated { booking } => {
                    next_id = next_id.max(booking.id + 1);
                    bookings.insert(booking.id, booking);
                }
                Event::BookingDeleted { id } => {
                    bookings.remove(&id);
                }
                Event::SequenceAdvanced { next_id: mark } => {
                    next_id = next_id.max(mark);
                }
            }
        }
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(bookings.len() as f64);

        Ok(Self {
            bookings,
            next_id: AtomicI64::new(next_id),
            wal_tx,
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: the id high-water mark plus one add per
    /// live booking.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let mut live: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        live.sort_by_key(|b| b.id);

        let mut events = Vec::with_capacity(live.len() + 1);
        events.push(Event::SequenceAdvanced {
            next_id: self.next_id.load(Ordering::SeqCst),
        });
        events.extend(live.into_iter().map(|booking| Event::BookingAdded { booking }));

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| StoreError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingStore for WalStore {
    async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<Booking>, StoreError> {
        let mut hits: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| range.encloses(&entry.value().range))
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by_key(|b| b.id);
        Ok(hits)
    }

    async fn add(&self, range: DateRange) -> Result<Booking, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let booking = Booking {
            id,
            range,
            created_at: now,
            modified_at: now,
        };
        self.wal_append(&Event::BookingAdded {
            booking: booking.clone(),
        })
        .await?;
        self.bookings.insert(id, booking.clone());
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(self.bookings.len() as f64);
        Ok(booking)
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, id: BookingId, range: DateRange) -> Result<Booking, StoreError> {
        let existing = self
            .bookings
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(id))?;
        let booking = Booking {
            id,
            range,
            created_at: existing.created_at,
            modified_at: Utc::now(),
        };
        self.wal_append(&Event::BookingUpdated {
            booking: booking.clone(),
        })
        .await?;
        self.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn delete(&self, id: BookingId) -> Result<u64, StoreError> {
        if !self.bookings.contains_key(&id) {
            return Ok(0);
        }
        self.wal_append(&Event::BookingDeleted { id }).await?;
        // A concurrent delete may have won the race after the existence
        // check; the replayed event is a no-op then, and we report 0 rows.
        let removed = self.bookings.remove(&id).is_some();
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(self.bookings.len() as f64);
        Ok(u64::from(removed))
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            debug!("compactor idle: {appends}/{threshold} appends");
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
