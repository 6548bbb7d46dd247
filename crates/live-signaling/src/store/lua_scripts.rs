//! Lua scripts for the Redis signaling store.
//!
//! Every mutation decodes the record, changes it, stores it and publishes
//! the new snapshot in one atomic script, so subscribers never miss a write
//! and concurrent candidate appends never overwrite each other.
//!
//! All scripts take:
//! - KEYS[1]: Record key (`stream:{id}:record`)
//! - KEYS[2]: Update channel (`stream:{id}:updates`)
//!
//! cjson encodes an empty Lua table as `{}`, so an empty candidate list is
//! always stored as an absent field.

/// Store a whole record and publish it.
///
/// Arguments:
/// - ARGV[1]: Record JSON
///
/// Returns:
/// - 1: Stored
pub const CREATE_RECORD: &str = r"
redis.call('SET', KEYS[1], ARGV[1])
redis.call('PUBLISH', KEYS[2], ARGV[1])
return 1
";

/// Merge present fields into the record.
///
/// Arguments:
/// - ARGV[1]: Patch JSON object (absent fields are not written)
///
/// Returns:
/// - 1: Updated
/// - 0: No record
pub const PATCH_RECORD: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end

local record = cjson.decode(raw)
local patch = cjson.decode(ARGV[1])
for field, value in pairs(patch) do
    record[field] = value
end

if record.candidates ~= nil and #record.candidates == 0 then
    record.candidates = nil
end

local encoded = cjson.encode(record)
redis.call('SET', KEYS[1], encoded)
redis.call('PUBLISH', KEYS[2], encoded)
return 1
";

/// Array-union append of one candidate.
///
/// Arguments:
/// - ARGV[1]: Candidate JSON
///
/// Returns:
/// - 1: Appended
/// - 2: Identical candidate already present (nothing published)
/// - 0: No record
pub const APPEND_CANDIDATE: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end

local record = cjson.decode(raw)
local candidate = cjson.decode(ARGV[1])

local function origin_of(c)
    if c.origin == nil or c.origin == cjson.null then
        return 'broadcaster'
    end
    return c.origin
end

local function same(a, b)
    return a.candidate == b.candidate
        and a.sdpMid == b.sdpMid
        and a.sdpMLineIndex == b.sdpMLineIndex
        and a.usernameFragment == b.usernameFragment
        and origin_of(a) == origin_of(b)
end

if record.candidates == nil or record.candidates == cjson.null then
    record.candidates = {}
end

for _, existing in ipairs(record.candidates) do
    if same(existing, candidate) then
        return 2
    end
end

table.insert(record.candidates, candidate)

local encoded = cjson.encode(record)
redis.call('SET', KEYS[1], encoded)
redis.call('PUBLISH', KEYS[2], encoded)
return 1
";

/// Drop offer, answer and candidates.
///
/// Returns:
/// - 1: Reset
/// - 0: No record
pub const RESET_NEGOTIATION: &str = r"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return 0
end

local record = cjson.decode(raw)
record.offer = nil
record.answer = nil
record.candidates = nil

local encoded = cjson.encode(record)
redis.call('SET', KEYS[1], encoded)
redis.call('PUBLISH', KEYS[2], encoded)
return 1
";
