//! Counter system over Windows PDH performance counters
//!
//! Each counter owns its own query so a failing counter can be closed and
//! reopened without disturbing the others.

use super::{Counter, CounterCategory, CounterSystem, RawCounter, StaticFact};
use crate::error::{Error, Result};
use crate::uptime::UptimeSample;
use std::ffi::OsStr;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::time::Duration;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, FILETIME};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhGetFormattedCounterValue, PdhOpenQueryW,
    PdhValidatePathW, PDH_FMT_COUNTERVALUE, PDH_FMT_DOUBLE, PDH_HCOUNTER, PDH_HQUERY,
};
use windows::Win32::System::SystemInformation::{
    GetSystemTimeAsFileTime, GetTickCount64, GlobalMemoryStatusEx, MEMORYSTATUSEX,
};
use windows::Win32::System::Threading::{GetProcessTimes, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

fn counter_path(counter: RawCounter) -> &'static str {
    match counter {
        RawCounter::ProcessorUtility => "\\Processor Information(_Total)\\% Processor Utility",
        RawCounter::ProcessorPerformance => "\\Processor Information(_Total)\\% Processor Performance",
        RawCounter::AvailableMemory => "\\Memory\\Available MBytes",
        RawCounter::DiskReadBytes => "\\PhysicalDisk(_Total)\\Disk Read Bytes/sec",
        RawCounter::DiskWriteBytes => "\\PhysicalDisk(_Total)\\Disk Write Bytes/sec",
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn filetime_100ns(ft: &FILETIME) -> u64 {
    (ft.dwHighDateTime as u64) << 32 | (ft.dwLowDateTime as u64)
}

#[derive(Debug, Default)]
pub struct PdhCounters;

impl PdhCounters {
    pub fn new() -> Self {
        Self
    }

    /// Age of the interactive session, taken from the shell process start
    fn session_age() -> Option<Duration> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).ok()?;
            let mut entry = PROCESSENTRY32W {
                dwSize: mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut shell_pid = None;
            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let len = entry.szExeFile.iter().position(|&c| c == 0).unwrap_or(entry.szExeFile.len());
                    let exe = String::from_utf16_lossy(&entry.szExeFile[..len]);
                    if exe.eq_ignore_ascii_case("explorer.exe") {
                        shell_pid = Some(entry.th32ProcessID);
                        break;
                    }
                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }
            let _ = CloseHandle(snapshot);

            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, shell_pid?).ok()?;
            let mut creation = FILETIME::default();
            let mut exit = FILETIME::default();
            let mut kernel = FILETIME::default();
            let mut user = FILETIME::default();
            let times = GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user);
            let _ = CloseHandle(handle);
            times.ok()?;

            let now = filetime_100ns(&GetSystemTimeAsFileTime());
            let started = filetime_100ns(&creation);
            let age_100ns = now.checked_sub(started)?;
            Some(Duration::from_micros(age_100ns / 10))
        }
    }
}

impl CounterSystem for PdhCounters {
    fn name(&self) -> &str {
        "pdh"
    }

    fn category_exists(&self, category: CounterCategory) -> bool {
        let probe = match category {
            CounterCategory::Processor => counter_path(RawCounter::ProcessorUtility),
            CounterCategory::Memory => counter_path(RawCounter::AvailableMemory),
            CounterCategory::PhysicalDisk => counter_path(RawCounter::DiskReadBytes),
        };
        let path = wide(probe);
        unsafe { PdhValidatePathW(PCWSTR::from_raw(path.as_ptr())) == 0 }
    }

    fn open(&self, counter: RawCounter) -> Result<Box<dyn Counter>> {
        Ok(Box::new(PdhCounter::open(counter_path(counter))?))
    }

    fn static_fact(&self, fact: StaticFact) -> Option<f64> {
        match fact {
            StaticFact::CpuBaseClockMhz => {
                use winreg::enums::*;
                use winreg::RegKey;

                let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
                let cpu_key = hklm.open_subkey("HARDWARE\\DESCRIPTION\\System\\CentralProcessor\\0").ok()?;
                let mhz: u32 = cpu_key.get_value("~MHz").ok()?;
                (mhz > 0).then_some(mhz as f64)
            }
            StaticFact::TotalMemoryMb => {
                let mut status: MEMORYSTATUSEX = unsafe { mem::zeroed() };
                status.dwLength = mem::size_of::<MEMORYSTATUSEX>() as u32;
                unsafe { GlobalMemoryStatusEx(&mut status) }.ok()?;
                Some(status.ullTotalPhys as f64 / 1_048_576.0)
            }
        }
    }

    fn uptime_sample(&self) -> Option<UptimeSample> {
        let ticks = unsafe { GetTickCount64() };
        Some(UptimeSample {
            boot_uptime: Duration::from_millis(ticks),
            session_age: Self::session_age(),
        })
    }
}

/// One PDH query holding a single counter
struct PdhCounter {
    query: PDH_HQUERY,
    counter: PDH_HCOUNTER,
}

// PDH handles are not tied to the creating thread
unsafe impl Send for PdhCounter {}

impl PdhCounter {
    fn open(path: &str) -> Result<Self> {
        let path = wide(path);
        unsafe {
            let mut query = mem::zeroed();
            let status = PdhOpenQueryW(PCWSTR::null(), 0, &mut query);
            if status != 0 {
                return Err(Error::Counter(format!("PdhOpenQueryW failed: {:#x}", status)));
            }

            let mut counter = mem::zeroed();
            let status = PdhAddEnglishCounterW(query, PCWSTR::from_raw(path.as_ptr()), 0, &mut counter);
            if status != 0 {
                let _ = PdhCloseQuery(query);
                return Err(Error::Counter(format!("PdhAddEnglishCounterW failed: {:#x}", status)));
            }

            Ok(Self { query, counter })
        }
    }
}

impl Counter for PdhCounter {
    fn next_value(&mut self) -> Result<f32> {
        unsafe {
            let status = PdhCollectQueryData(self.query);
            if status != 0 {
                return Err(Error::Counter(format!("PdhCollectQueryData failed: {:#x}", status)));
            }

            let mut value = PDH_FMT_COUNTERVALUE::default();
            let status = PdhGetFormattedCounterValue(self.counter, PDH_FMT_DOUBLE, None, &mut value);
            if status != 0 {
                return Err(Error::Counter(format!("PdhGetFormattedCounterValue failed: {:#x}", status)));
            }
            Ok(value.Anonymous.doubleValue as f32)
        }
    }
}

impl Drop for PdhCounter {
    fn drop(&mut self) {
        unsafe {
            let _ = PdhCloseQuery(self.query);
        }
    }
}
