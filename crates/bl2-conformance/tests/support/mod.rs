#![allow(dead_code)]

use bl2_dtype::BlasElement;
use bl2_ffi::{FfiError, Level2Routines};
use bl2_linalg::{Diag, Transpose, Uplo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn store<E: Copy>(dst: &mut [E], src: &[E]) {
    dst[..src.len()].copy_from_slice(src);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// gemv returns without writing `y`.
    StaleGemv,
    /// gemv zeroes `y` whenever another caller is inside it at the same time.
    NonReentrantGemv,
}

/// Routines computed with the dense oracles, with an optional injected
/// fault. Every call is counted.
pub struct ReferenceRoutines {
    fault: Fault,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
}

impl ReferenceRoutines {
    pub fn correct() -> Self {
        Self::with_fault(Fault::None)
    }

    pub fn with_fault(fault: Fault) -> Self {
        Self {
            fault,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst) > 0
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<E: BlasElement> Level2Routines<E> for ReferenceRoutines {
    fn gemv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        let mut overlapped = self.enter();
        let result = bl2_linalg::gemv(trans, m, n, alpha, a, lda, x, beta, y);
        if self.fault == Fault::NonReentrantGemv {
            thread::sleep(Duration::from_millis(2));
            overlapped |= self.in_flight.load(Ordering::SeqCst) > 1;
        }
        self.leave();
        let out = result?;
        match self.fault {
            Fault::StaleGemv => {}
            Fault::NonReentrantGemv if overlapped => y.fill(E::zero()),
            _ => store(y, &out),
        }
        Ok(())
    }

    fn gbmv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        kl: usize,
        ku: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        self.enter();
        let result = bl2_linalg::gbmv(trans, m, n, kl, ku, alpha, a, lda, x, beta, y);
        self.leave();
        store(y, &result?);
        Ok(())
    }

    fn trmv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError> {
        self.enter();
        let result = bl2_linalg::trmv(uplo, trans, diag, n, a, lda, x);
        self.leave();
        store(x, &result?);
        Ok(())
    }

    fn trsv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError> {
        self.enter();
        let result = bl2_linalg::trsv(uplo, trans, diag, n, a, lda, x);
        self.leave();
        store(x, &result?);
        Ok(())
    }

    fn symv_hemv(
        &self,
        uplo: Uplo,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        self.enter();
        let result = if E::KIND.is_complex() {
            bl2_linalg::hemv(uplo, n, alpha, a, lda, x, beta, y)
        } else {
            bl2_linalg::symv(uplo, n, alpha, a, lda, x, beta, y)
        };
        self.leave();
        store(y, &result?);
        Ok(())
    }

    fn ger(
        &self,
        m: usize,
        n: usize,
        alpha: E,
        x: &[E],
        y: &[E],
        a: &mut [E],
        lda: usize,
    ) -> Result<(), FfiError> {
        self.enter();
        let result = bl2_linalg::ger(m, n, alpha, x, y, a, lda);
        self.leave();
        store(a, &result?);
        Ok(())
    }
}
