//! Process-lifetime bootstrap.
//!
//! ELF initializer/finalizer entries stand in for a static object's
//! constructor and destructor: init runs at load, shutdown at exit. Some
//! platforms deliver allocation requests before initializers complete, which
//! is why every hook also calls init defensively on entry.

extern "C" fn startup() {
    memcheckup_core::init();
}

extern "C" fn teardown() {
    memcheckup_core::shutdown();
}

#[used]
#[unsafe(link_section = ".init_array")]
static STARTUP: extern "C" fn() = startup;

#[used]
#[unsafe(link_section = ".fini_array")]
static TEARDOWN: extern "C" fn() = teardown;
